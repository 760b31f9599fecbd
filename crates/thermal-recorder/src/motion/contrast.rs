//! Contrast-based motion detector.

use std::sync::Arc;

use crate::active_area::ActiveAreaMask;
use crate::config::{ActiveAreaConfig, MotionConfig};
use crate::frame::{CameraSpec, Frame};

use super::{refit_mask, Detector};

/// Reports motion when the hottest and coldest active cells differ by more
/// than `contrast_thresh`.
///
/// The exposed background is the latest frame without motion.
#[derive(Debug)]
pub struct ContrastDetector {
    mask: Arc<ActiveAreaMask>,
    area: ActiveAreaConfig,
    background: Frame,
    contrast_thresh: u16,
}

impl ContrastDetector {
    /// Create a detector for `camera` restricted to `mask`.
    #[must_use]
    pub fn new(conf: &MotionConfig, mask: Arc<ActiveAreaMask>, camera: &CameraSpec) -> Self {
        Self {
            mask,
            area: conf.active_area.clone(),
            background: Frame::for_camera(camera),
            contrast_thresh: conf.contrast_thresh,
        }
    }
}

impl Detector for ContrastDetector {
    fn detect(&mut self, frame: &Frame) -> bool {
        if frame.rows() != self.mask.rows() || frame.columns() != self.mask.columns() {
            self.reset(&CameraSpec::new(frame.rows(), frame.columns(), 0));
        }

        let (min, max) = frame
            .pixels()
            .iter()
            .zip(self.mask.cells())
            .filter(|(_, active)| **active)
            .fold((u16::MAX, u16::MIN), |(lo, hi), (v, _)| (lo.min(*v), hi.max(*v)));

        let motion = max > min && max - min > self.contrast_thresh;
        if !motion {
            self.background.copy_from(frame);
        }
        motion
    }

    fn reset(&mut self, camera: &CameraSpec) {
        refit_mask(&mut self.mask, &self.area, camera);
        self.background = Frame::for_camera(camera);
    }

    fn background(&self) -> &Frame {
        &self.background
    }

    fn threshold(&self) -> u16 {
        self.contrast_thresh
    }
}
