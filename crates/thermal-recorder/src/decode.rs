//! Raw sensor frame decoding.
//!
//! Converts the byte buffer delivered by the sensor driver into a [`Frame`].
//! The byte layout depends on the sensor revision and is selected through
//! [`RawFormat`].

use std::fmt;
use std::time::Duration;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::{Frame, Telemetry};

/// Offset between degrees Celsius and Kelvin, in centi-degrees.
const CENTI_KELVIN_OFFSET: i64 = 27_315;

/// Telemetry stamped on every decoded frame.
///
/// The sensor does not report calibration events, so frames claim the last
/// calibration happened long ago. Without this the calibration guard in the
/// motion detector would suppress every trigger.
const PLACEHOLDER_TELEMETRY: Telemetry = Telemetry {
    last_ffc_time: Duration::from_secs(1),
    time_on: Duration::from_secs(60),
};

/// Byte encoding of a raw sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFormat {
    /// Unsigned 16-bit little-endian codes, copied as-is.
    #[default]
    U16Le,
    /// Unsigned 16-bit big-endian codes, copied as-is.
    U16Be,
    /// Half-precision little-endian degrees Celsius, stored as centi-Kelvin.
    F16Le,
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U16Le => write!(f, "u16_le"),
            Self::U16Be => write!(f, "u16_be"),
            Self::F16Le => write!(f, "f16_le"),
        }
    }
}

impl std::str::FromStr for RawFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "u16_le" => Ok(Self::U16Le),
            "u16_be" => Ok(Self::U16Be),
            "f16_le" => Ok(Self::F16Le),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decodes raw sensor buffers in a fixed [`RawFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecoder {
    format: RawFormat,
}

impl FrameDecoder {
    /// Create a decoder for the given format.
    #[must_use]
    pub fn new(format: RawFormat) -> Self {
        Self { format }
    }

    /// The format this decoder reads.
    #[must_use]
    pub fn format(&self) -> RawFormat {
        self.format
    }

    /// Decode `raw` into `out`, overwriting every cell and the telemetry.
    ///
    /// Trailing bytes beyond the frame geometry are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `raw` holds fewer than two bytes per cell.
    /// `out` is left untouched in that case.
    pub fn decode(&self, raw: &[u8], out: &mut Frame) -> Result<()> {
        let expected = out.rows() * out.columns() * 2;
        if raw.len() < expected {
            return Err(Error::Decode {
                expected,
                actual: raw.len(),
            });
        }

        let cells = raw[..expected].chunks_exact(2);
        for (pix, bytes) in out.pixels_mut().iter_mut().zip(cells) {
            let bytes = [bytes[0], bytes[1]];
            *pix = match self.format {
                RawFormat::U16Le => u16::from_le_bytes(bytes),
                RawFormat::U16Be => u16::from_be_bytes(bytes),
                RawFormat::F16Le => celsius_to_code(f16::from_le_bytes(bytes).to_f32()),
            };
        }
        out.status = PLACEHOLDER_TELEMETRY;
        Ok(())
    }
}

/// Convert degrees Celsius to the centi-Kelvin code space, saturating at the
/// ends of the `u16` range.
#[must_use]
pub fn celsius_to_code(celsius: f32) -> u16 {
    let code = (f64::from(celsius) * 100.0).round() as i64 + CENTI_KELVIN_OFFSET;
    code.clamp(0, i64::from(u16::MAX)) as u16
}

/// Convert a centi-Kelvin code back to degrees Celsius.
#[must_use]
pub fn code_to_celsius(code: u16) -> f32 {
    (i64::from(code) - CENTI_KELVIN_OFFSET) as f32 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_f16(values: &[f32]) -> Vec<u8> {
        values
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_le_bytes())
            .collect()
    }

    #[test]
    fn test_decode_u16_le() {
        let raw = [0x34, 0x12, 0x01, 0x00, 0xff, 0xff, 0x00, 0x80];
        let mut frame = Frame::new(2, 2);
        FrameDecoder::new(RawFormat::U16Le)
            .decode(&raw, &mut frame)
            .unwrap();
        assert_eq!(frame.pixels(), &[0x1234, 0x0001, 0xffff, 0x8000]);
    }

    #[test]
    fn test_decode_u16_be() {
        let raw = [0x12, 0x34, 0x00, 0x01, 0xff, 0xff, 0x80, 0x00];
        let mut frame = Frame::new(2, 2);
        FrameDecoder::new(RawFormat::U16Be)
            .decode(&raw, &mut frame)
            .unwrap();
        assert_eq!(frame.pixels(), &[0x1234, 0x0001, 0xffff, 0x8000]);
    }

    #[test]
    fn test_decode_f16_le_to_centi_kelvin() {
        let raw = encode_f16(&[0.0, 20.5, -10.25, 36.0]);
        let mut frame = Frame::new(2, 2);
        FrameDecoder::new(RawFormat::F16Le)
            .decode(&raw, &mut frame)
            .unwrap();
        assert_eq!(frame.pixels(), &[27_315, 29_365, 26_290, 30_915]);
    }

    #[test]
    fn test_decode_sets_placeholder_telemetry() {
        let raw = [0u8; 8];
        let mut frame = Frame::new(2, 2);
        FrameDecoder::new(RawFormat::U16Le)
            .decode(&raw, &mut frame)
            .unwrap();
        assert_eq!(frame.status.last_ffc_time, Duration::from_secs(1));
        assert_eq!(frame.status.time_on, Duration::from_secs(60));
    }

    #[test]
    fn test_decode_short_buffer_fails() {
        let mut frame = Frame::new(2, 2);
        frame.fill(5);
        for format in [RawFormat::U16Le, RawFormat::U16Be, RawFormat::F16Le] {
            let result = FrameDecoder::new(format).decode(&[0u8; 7], &mut frame);
            assert!(matches!(
                result,
                Err(Error::Decode {
                    expected: 8,
                    actual: 7
                })
            ));
        }
        assert_eq!(frame.pixels(), &[5, 5, 5, 5]);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let raw = [1, 0, 2, 0, 3, 0, 4, 0, 9, 9];
        let mut frame = Frame::new(2, 2);
        FrameDecoder::new(RawFormat::U16Le)
            .decode(&raw, &mut frame)
            .unwrap();
        assert_eq!(frame.pixels(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_code_to_celsius() {
        assert!((code_to_celsius(27_315)).abs() < f32::EPSILON);
        assert!((code_to_celsius(29_365) - 20.5).abs() < 0.001);
        assert!((code_to_celsius(0) + 273.15).abs() < 0.001);
    }

    #[test]
    fn test_celsius_to_code_saturates() {
        assert_eq!(celsius_to_code(-400.0), 0);
        assert_eq!(celsius_to_code(1000.0), u16::MAX);
    }

    #[test]
    fn test_raw_format_from_str() {
        assert_eq!("u16_le".parse::<RawFormat>().unwrap(), RawFormat::U16Le);
        assert_eq!("f16_le".parse::<RawFormat>().unwrap(), RawFormat::F16Le);
        assert!("rgb24".parse::<RawFormat>().is_err());
    }

    #[test]
    fn test_raw_format_display_round_trips() {
        for format in [RawFormat::U16Le, RawFormat::U16Be, RawFormat::F16Le] {
            assert_eq!(format.to_string().parse::<RawFormat>().unwrap(), format);
        }
    }
}
