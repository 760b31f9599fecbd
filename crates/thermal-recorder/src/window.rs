//! Time-of-day recording window.
//!
//! [`RecordingWindow::active`] answers whether a new clip may start right now.
//! Bounds are either fixed times of day or offsets from sunrise and sunset.
//! Sun times are computed outside the recorder and supplied through the
//! [`SunTimes`] trait.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use crate::config::{LocationConfig, WindowConfig};
use crate::error::{Error, Result};

/// Source of the current local time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Provider of local sunrise and sunset times.
pub trait SunTimes: Send + Sync + fmt::Debug {
    /// Sunrise and sunset on `date`, or `None` if unknown (e.g. polar day).
    fn sun_times(&self, date: NaiveDate) -> Option<(NaiveTime, NaiveTime)>;
}

/// The same sunrise and sunset every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSunTimes {
    /// Local sunrise.
    pub sunrise: NaiveTime,
    /// Local sunset.
    pub sunset: NaiveTime,
}

impl SunTimes for FixedSunTimes {
    fn sun_times(&self, _date: NaiveDate) -> Option<(NaiveTime, NaiveTime)> {
        Some((self.sunrise, self.sunset))
    }
}

/// One end of a recording window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBound {
    /// A fixed time of day.
    Fixed(NaiveTime),
    /// Sunrise shifted by an offset.
    Sunrise(TimeDelta),
    /// Sunset shifted by an offset.
    Sunset(TimeDelta),
}

impl WindowBound {
    /// Parse a bound. Empty input means "no bound".
    ///
    /// Accepted forms: `HH:MM`, `HH:MM:SS`, `sunrise`, `sunset`, and either of
    /// the latter followed by a signed offset in minutes or hours, such as
    /// `sunset-30m` or `sunrise+1h`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the input matches none of these.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }
        if let Some(rest) = input.strip_prefix("sunrise") {
            return Ok(Some(Self::Sunrise(parse_offset(input, rest)?)));
        }
        if let Some(rest) = input.strip_prefix("sunset") {
            return Ok(Some(Self::Sunset(parse_offset(input, rest)?)));
        }
        parse_time_of_day(input).map(|t| Some(Self::Fixed(t)))
    }

    /// Resolve to a time of day on `date`.
    fn resolve(&self, date: NaiveDate, sun: Option<&dyn SunTimes>) -> Option<NaiveTime> {
        match self {
            Self::Fixed(time) => Some(*time),
            Self::Sunrise(offset) => {
                let (sunrise, _) = sun?.sun_times(date)?;
                Some(sunrise.overflowing_add_signed(*offset).0)
            }
            Self::Sunset(offset) => {
                let (_, sunset) = sun?.sun_times(date)?;
                Some(sunset.overflowing_add_signed(*offset).0)
            }
        }
    }

    fn needs_sun_times(&self) -> bool {
        !matches!(self, Self::Fixed(_))
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
///
/// # Errors
///
/// Returns [`Error::ConfigValidation`] if the input is not a valid time.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .map_err(|_| Error::ConfigValidation {
            message: format!("invalid time of day: {input}"),
        })
}

fn parse_offset(input: &str, rest: &str) -> Result<TimeDelta> {
    if rest.is_empty() {
        return Ok(TimeDelta::zero());
    }
    let invalid = || Error::ConfigValidation {
        message: format!("invalid window offset: {input}"),
    };

    let (sign, rest) = match rest.as_bytes()[0] {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return Err(invalid()),
    };
    let unit = rest.chars().last().ok_or_else(invalid)?;
    let amount: u32 = rest[..rest.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    let minutes = match unit {
        'm' => i64::from(amount),
        'h' => i64::from(amount) * 60,
        _ => return Err(invalid()),
    };
    if minutes >= 24 * 60 {
        return Err(invalid());
    }
    Ok(TimeDelta::minutes(sign * minutes))
}

/// Predicate deciding whether a new recording may start.
#[derive(Debug, Clone)]
pub struct RecordingWindow {
    start: Option<WindowBound>,
    end: Option<WindowBound>,
    clock: Arc<dyn Clock>,
    sun: Option<Arc<dyn SunTimes>>,
}

impl Default for RecordingWindow {
    fn default() -> Self {
        Self::always()
    }
}

impl RecordingWindow {
    /// A window that is always open.
    #[must_use]
    pub fn always() -> Self {
        Self::new(None, None)
    }

    /// A window between two bounds using the system clock.
    ///
    /// A missing start opens the window at midnight; a missing end keeps it
    /// open until midnight. When start is later than end the window spans
    /// midnight.
    #[must_use]
    pub fn new(start: Option<WindowBound>, end: Option<WindowBound>) -> Self {
        Self {
            start,
            end,
            clock: Arc::new(SystemClock),
            sun: None,
        }
    }

    /// Build a window from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound or sun time cannot be parsed.
    pub fn from_config(window: &WindowConfig, location: &LocationConfig) -> Result<Self> {
        let mut result = Self::new(
            WindowBound::parse(&window.start)?,
            WindowBound::parse(&window.end)?,
        );
        if let (Some(sunrise), Some(sunset)) = (&location.sunrise, &location.sunset) {
            result = result.with_sun_times(Arc::new(FixedSunTimes {
                sunrise: parse_time_of_day(sunrise)?,
                sunset: parse_time_of_day(sunset)?,
            }));
        }
        Ok(result)
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Supply sunrise and sunset times.
    #[must_use]
    pub fn with_sun_times(mut self, sun: Arc<dyn SunTimes>) -> Self {
        self.sun = Some(sun);
        self
    }

    /// Whether the window has no bounds.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether a bound depends on sun times that were not supplied.
    #[must_use]
    pub fn missing_sun_times(&self) -> bool {
        self.sun.is_none()
            && [self.start, self.end]
                .iter()
                .flatten()
                .any(WindowBound::needs_sun_times)
    }

    /// Whether starting a recording is permitted now.
    #[must_use]
    pub fn active(&self) -> bool {
        self.active_at(self.clock.now())
    }

    /// Whether starting a recording is permitted at `now`.
    ///
    /// A sun-relative bound that cannot be resolved keeps the window closed.
    #[must_use]
    pub fn active_at(&self, now: NaiveDateTime) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let date = now.date();
        let sun = self.sun.as_deref();
        let start = match self.start {
            Some(bound) => bound.resolve(date, sun),
            None => Some(NaiveTime::MIN),
        };
        let end = match self.end {
            Some(bound) => bound.resolve(date, sun),
            None => None,
        };
        let Some(start) = start else {
            return false;
        };
        if self.end.is_some() && end.is_none() {
            return false;
        }

        let time = now.time();
        match end {
            None => time >= start,
            Some(end) if start == end => true,
            Some(end) if start < end => start <= time && time < end,
            Some(end) => time >= start || time < end,
        }
    }
}
