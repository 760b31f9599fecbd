//! Logging configuration for thermal-recorder.
//!
//! This module provides initialization for the tracing-based logging system
//! and [`LogLimiter`], which keeps recurring failures (a full disk, a closed
//! recording window) from flooding the log at frame rate.

use std::time::{Duration, Instant};

use tracing::{warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Initialize the logging system.
///
/// This should be called once at application startup. The logging level can be
/// controlled via:
/// 1. The `verbosity` parameter
/// 2. The `RUST_LOG` environment variable (takes precedence)
///
/// # Examples
///
/// ```no_run
/// use thermal_recorder::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let default_filter = format!("thermal_recorder={}", verbosity.to_level_filter());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Ignore the error if a subscriber is already installed
    let _ = subscriber.try_init();
}

/// Initialize logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

/// Emits at most one warning per interval.
///
/// Messages arriving inside the interval are counted rather than logged, and
/// the count is reported with the next message that gets through.
#[derive(Debug, Clone)]
pub struct LogLimiter {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl LogLimiter {
    /// Create a limiter allowing one message per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Number of messages swallowed since the last one was emitted.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Decide whether a message arriving at `now` may be emitted.
    ///
    /// Returns the number of messages suppressed since the previous emission
    /// when allowed, or `None` when the message must be swallowed.
    pub fn allow_at(&mut self, now: Instant) -> Option<u64> {
        let due = self
            .last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    /// Log `message` at warn level unless rate limited.
    ///
    /// Returns `true` if the message was emitted.
    pub fn warn(&mut self, message: std::fmt::Arguments<'_>) -> bool {
        match self.allow_at(Instant::now()) {
            Some(0) => {
                warn!("{message}");
                true
            }
            Some(suppressed) => {
                warn!("{message} ({suppressed} similar messages suppressed)");
                true
            }
            None => false,
        }
    }
}
