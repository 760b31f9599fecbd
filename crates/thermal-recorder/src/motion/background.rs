//! Background-subtraction motion detector.

use std::sync::Arc;
use std::time::Duration;

use crate::active_area::ActiveAreaMask;
use crate::config::{ActiveAreaConfig, MotionConfig};
use crate::frame::{CameraSpec, Frame};

use super::{refit_mask, Detector};

/// Detects warm moving objects against a rolling background estimate.
///
/// A cell counts as moving when it is at least as warm as the temperature
/// threshold and differs from the background by at least `delta_thresh`.
/// Motion is reported once `count_thresh` active cells are moving.
///
/// The background follows cooler readings immediately and warms up slowly
/// (by `1 / background_decay` of the difference per frame) on cells that are
/// not moving, so a warm animal standing still does not become background
/// within a few frames.
#[derive(Debug)]
pub struct MotionDetector {
    mask: Arc<ActiveAreaMask>,
    area: ActiveAreaConfig,
    background: Frame,
    has_background: bool,
    base_thresh: u16,
    threshold: u16,
    delta_thresh: u16,
    count_thresh: usize,
    dynamic_threshold: bool,
    warmer_only: bool,
    decay: u16,
    calibration_guard: Duration,
}

impl MotionDetector {
    /// Create a detector for `camera` restricted to `mask`.
    #[must_use]
    pub fn new(conf: &MotionConfig, mask: Arc<ActiveAreaMask>, camera: &CameraSpec) -> Self {
        Self {
            mask,
            area: conf.active_area.clone(),
            background: Frame::for_camera(camera),
            has_background: false,
            base_thresh: conf.temp_thresh,
            threshold: conf.temp_thresh,
            delta_thresh: conf.delta_thresh,
            count_thresh: conf.count_thresh,
            dynamic_threshold: conf.dynamic_threshold,
            warmer_only: conf.warmer_only,
            decay: conf.background_decay.max(1),
            calibration_guard: Duration::from_secs(conf.calibration_guard_secs),
        }
    }

    /// Whether a background has been captured since the last reset.
    #[must_use]
    pub fn has_background(&self) -> bool {
        self.has_background
    }

    /// Mean background value over the active cells.
    fn background_mean(&self) -> Option<u16> {
        let (sum, count) = self
            .background
            .pixels()
            .iter()
            .zip(self.mask.cells())
            .filter(|(_, active)| **active)
            .fold((0u64, 0u64), |(sum, n), (v, _)| (sum + u64::from(*v), n + 1));
        (count > 0).then(|| (sum / count) as u16)
    }
}

impl Detector for MotionDetector {
    fn detect(&mut self, frame: &Frame) -> bool {
        if frame.rows() != self.background.rows() || frame.columns() != self.background.columns()
        {
            self.reset(&CameraSpec::new(frame.rows(), frame.columns(), 0));
        }

        // Readings right after a flat field calibration are unreliable.
        if frame.status.since_calibration() < self.calibration_guard {
            return false;
        }

        if !self.has_background {
            self.background.copy_from(frame);
            self.has_background = true;
            return false;
        }

        if self.dynamic_threshold {
            if let Some(mean) = self.background_mean() {
                self.threshold = self
                    .base_thresh
                    .max(mean.saturating_add(self.delta_thresh));
            }
        }

        let (threshold, delta, decay) = (self.threshold, self.delta_thresh, self.decay);
        let warmer_only = self.warmer_only;
        let cells = self.mask.cells();
        let mut moving = 0;

        for ((pix, bg), active) in frame
            .pixels()
            .iter()
            .zip(self.background.pixels_mut())
            .zip(cells)
        {
            let diff = if warmer_only {
                pix.saturating_sub(*bg)
            } else {
                pix.abs_diff(*bg)
            };
            let is_moving = *pix >= threshold && diff >= delta;
            if is_moving && *active {
                moving += 1;
            }

            if *pix < *bg {
                *bg = *pix;
            } else if !is_moving {
                *bg += (*pix - *bg) / decay;
            }
        }

        moving >= self.count_thresh
    }

    fn reset(&mut self, camera: &CameraSpec) {
        refit_mask(&mut self.mask, &self.area, camera);
        if self.background.rows() == camera.rows && self.background.columns() == camera.columns {
            self.background.fill(0);
        } else {
            self.background = Frame::for_camera(camera);
        }
        self.has_background = false;
        self.threshold = self.base_thresh;
    }

    fn background(&self) -> &Frame {
        &self.background
    }

    fn threshold(&self) -> u16 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Telemetry;

    const COOL: u16 = 29_315; // 20 C
    const WARM: u16 = 30_815; // 35 C

    fn conf() -> MotionConfig {
        let mut conf = MotionConfig::default();
        conf.active_area.enabled = false;
        conf.dynamic_threshold = false;
        conf
    }

    fn camera() -> CameraSpec {
        CameraSpec::new(4, 4, 8)
    }

    fn detector(conf: &MotionConfig) -> MotionDetector {
        let camera = camera();
        let mask = Arc::new(conf.active_area.build_mask(&camera));
        MotionDetector::new(conf, mask, &camera)
    }

    fn scene(warm_cells: &[(usize, usize)]) -> Frame {
        let mut frame = Frame::new(4, 4);
        frame.fill(COOL);
        for (y, x) in warm_cells {
            frame.set(*y, *x, WARM);
        }
        frame.status = Telemetry {
            last_ffc_time: Duration::from_secs(1),
            time_on: Duration::from_secs(60),
        };
        frame
    }

    const BLOB: [(usize, usize); 4] = [(1, 1), (1, 2), (2, 1), (2, 2)];

    #[test]
    fn test_first_frame_seeds_background() {
        let mut detector = detector(&conf());
        assert!(!detector.has_background());
        assert!(!detector.detect(&scene(&BLOB)));
        assert!(detector.has_background());
    }

    #[test]
    fn test_static_scene_has_no_motion() {
        let mut detector = detector(&conf());
        for _ in 0..10 {
            assert!(!detector.detect(&scene(&[])));
        }
    }

    #[test]
    fn test_warm_blob_is_motion() {
        let mut detector = detector(&conf());
        detector.detect(&scene(&[]));
        assert!(detector.detect(&scene(&BLOB)));
    }

    #[test]
    fn test_too_few_cells_is_not_motion() {
        let mut detector = detector(&conf());
        detector.detect(&scene(&[]));
        assert!(!detector.detect(&scene(&BLOB[..2])));
    }

    #[test]
    fn test_blob_outside_active_area_is_ignored() {
        let mut conf = conf();
        conf.active_area.enabled = true;
        let camera = camera();
        // Zone covers only the top-left corner of the grid.
        conf.active_area.points = [
            crate::active_area::Point::new(0.0, 0.0),
            crate::active_area::Point::new(1.0, 0.0),
            crate::active_area::Point::new(0.0, 1.0),
            crate::active_area::Point::new(1.0, 1.0),
        ];
        let mask = Arc::new(conf.active_area.build_mask(&camera));
        let mut detector = MotionDetector::new(&conf, mask, &camera);

        detector.detect(&scene(&[]));
        assert!(!detector.detect(&scene(&[(2, 2), (2, 3), (3, 2), (3, 3)])));
        assert!(detector.detect(&scene(&[(0, 0), (0, 1), (1, 0), (1, 1)])));
    }

    #[test]
    fn test_calibration_guard_suppresses_motion() {
        let mut detector = detector(&conf());
        detector.detect(&scene(&[]));

        let mut frame = scene(&BLOB);
        frame.status = Telemetry {
            last_ffc_time: Duration::from_secs(55),
            time_on: Duration::from_secs(60),
        };
        assert!(!detector.detect(&frame));
    }

    #[test]
    fn test_background_follows_cooler_readings() {
        let mut detector = detector(&conf());
        detector.detect(&scene(&[]));

        let mut colder = scene(&[]);
        colder.set(0, 0, COOL - 500);
        detector.detect(&colder);
        assert_eq!(detector.background().get(0, 0), COOL - 500);
    }

    #[test]
    fn test_moving_cells_do_not_warm_background() {
        let mut detector = detector(&conf());
        detector.detect(&scene(&[]));
        for _ in 0..20 {
            detector.detect(&scene(&BLOB));
        }
        assert_eq!(detector.background().get(1, 1), COOL);
    }

    #[test]
    fn test_dynamic_threshold_rises_with_warm_background() {
        let mut conf = conf();
        conf.dynamic_threshold = true;
        let mut detector = detector(&conf);

        let mut hot_scene = scene(&[]);
        hot_scene.fill(30_315);
        detector.detect(&hot_scene);
        detector.detect(&hot_scene);
        assert_eq!(detector.threshold(), 30_315 + conf.delta_thresh);
    }

    #[test]
    fn test_reset_clears_background() {
        let mut detector = detector(&conf());
        detector.detect(&scene(&[]));
        detector.reset(&camera());
        assert!(!detector.has_background());
        assert!(!detector.detect(&scene(&BLOB)));
    }

    #[test]
    fn test_reset_with_new_geometry() {
        let mut detector = detector(&conf());
        detector.reset(&CameraSpec::new(2, 3, 8));
        assert_eq!(detector.background().rows(), 2);
        assert_eq!(detector.background().columns(), 3);
    }

    #[test]
    fn test_repeated_detect_keeps_state_bounded() {
        let mut detector = detector(&conf());
        for i in 0..100 {
            detector.detect(&scene(if i % 2 == 0 { &BLOB } else { &[] }));
        }
        assert_eq!(detector.background().pixels().len(), 16);
    }
}
