//! Motion detection.
//!
//! A [`Detector`] looks at one frame at a time and reports whether a warm
//! object is moving inside the observation zone. Two algorithms exist:
//!
//! - [`MotionDetector`]: background subtraction with a temperature threshold.
//!   This is the production algorithm and the only one that maintains a real
//!   background estimate for the recording sink.
//! - [`ContrastDetector`]: flags motion when the spread between the hottest
//!   and coldest active cell is large. Kept as a fallback for sensors whose
//!   noise defeats background subtraction.

mod background;
mod contrast;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::active_area::ActiveAreaMask;
use crate::config::MotionConfig;
use crate::frame::{CameraSpec, Frame};

pub use background::MotionDetector;
pub use contrast::ContrastDetector;

/// A per-frame motion analyzer.
///
/// Implementations keep a bounded amount of state: calling [`detect`] any
/// number of times must not grow memory.
///
/// [`detect`]: Detector::detect
pub trait Detector: Send {
    /// Analyze `frame` and report whether motion is present.
    fn detect(&mut self, frame: &Frame) -> bool;

    /// Discard background state, e.g. after the camera changed.
    fn reset(&mut self, camera: &CameraSpec);

    /// Current background estimate, handed to the sink when a clip starts.
    fn background(&self) -> &Frame;

    /// Current temperature threshold, handed to the sink when a clip starts.
    fn threshold(&self) -> u16;
}

/// Selects the motion detection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Background subtraction.
    #[default]
    Background,
    /// Max-min contrast within the observation zone.
    Contrast,
}

/// Build the configured detector for a camera.
#[must_use]
pub fn build_detector(conf: &MotionConfig, camera: &CameraSpec) -> Box<dyn Detector> {
    let mask = Arc::new(conf.active_area.build_mask(camera));
    match conf.detector {
        DetectorKind::Background => Box::new(MotionDetector::new(conf, mask, camera)),
        DetectorKind::Contrast => Box::new(ContrastDetector::new(conf, mask, camera)),
    }
}

/// Rebuild `mask` for a new camera if the geometry changed.
fn refit_mask(
    mask: &mut Arc<ActiveAreaMask>,
    conf: &crate::config::ActiveAreaConfig,
    camera: &CameraSpec,
) {
    if mask.rows() != camera.rows || mask.columns() != camera.columns {
        *mask = Arc::new(conf.build_mask(camera));
    }
}
