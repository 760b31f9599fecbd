//! Core frame types for thermal-recorder.
//!
//! A [`Frame`] is a fixed-size grid of 16-bit temperature codes plus the
//! sensor telemetry that came with it. Frames are allocated once and reused;
//! copying one into another of the same geometry never allocates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sensor geometry and cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSpec {
    /// Number of pixel rows.
    pub rows: usize,
    /// Number of pixel columns.
    pub columns: usize,
    /// Frames delivered per second.
    pub fps: u32,
}

impl CameraSpec {
    /// Create a new camera spec.
    #[must_use]
    pub fn new(rows: usize, columns: usize, fps: u32) -> Self {
        Self { rows, columns, fps }
    }

    /// Number of cells in one frame.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Length in bytes of one raw sensor frame (two bytes per cell).
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.pixel_count() * 2
    }

    /// Check whether two specs describe the same grid shape.
    #[must_use]
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.rows == other.rows && self.columns == other.columns
    }
}

impl Default for CameraSpec {
    fn default() -> Self {
        Self::new(24, 32, 8)
    }
}

/// Sensor telemetry attached to each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Device uptime at which the last flat field calibration happened.
    pub last_ffc_time: Duration,
    /// Device uptime when the frame was captured.
    pub time_on: Duration,
}

impl Telemetry {
    /// Time elapsed between the last calibration and this frame.
    #[must_use]
    pub fn since_calibration(&self) -> Duration {
        self.time_on.saturating_sub(self.last_ffc_time)
    }
}

/// A single thermal frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    rows: usize,
    columns: usize,
    pix: Vec<u16>,
    /// Telemetry reported with the frame.
    pub status: Telemetry,
}

impl Frame {
    /// Create a zeroed frame with the given dimensions.
    #[must_use]
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            pix: vec![0; rows * columns],
            status: Telemetry::default(),
        }
    }

    /// Create a zeroed frame sized for a camera.
    #[must_use]
    pub fn for_camera(camera: &CameraSpec) -> Self {
        Self::new(camera.rows, camera.columns)
    }

    /// Number of pixel rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of pixel columns.
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Read the value at row `y`, column `x`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the grid.
    #[must_use]
    pub fn get(&self, y: usize, x: usize) -> u16 {
        self.pix[y * self.columns + x]
    }

    /// Write the value at row `y`, column `x`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the grid.
    pub fn set(&mut self, y: usize, x: usize, value: u16) {
        self.pix[y * self.columns + x] = value;
    }

    /// One row of the grid.
    #[must_use]
    pub fn row(&self, y: usize) -> &[u16] {
        let start = y * self.columns;
        &self.pix[start..start + self.columns]
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn pixels(&self) -> &[u16] {
        &self.pix
    }

    /// All cells in row-major order, mutably.
    pub fn pixels_mut(&mut self) -> &mut [u16] {
        &mut self.pix
    }

    /// Set every cell to `value`.
    pub fn fill(&mut self, value: u16) {
        self.pix.fill(value);
    }

    /// Deep copy `other` into this frame.
    ///
    /// Reuses the existing buffer when the geometry matches.
    pub fn copy_from(&mut self, other: &Frame) {
        if self.pix.len() == other.pix.len() {
            self.pix.copy_from_slice(&other.pix);
        } else {
            self.pix.clone_from(&other.pix);
        }
        self.rows = other.rows;
        self.columns = other.columns;
        self.status = other.status;
    }

    /// Smallest and largest value in the frame.
    #[must_use]
    pub fn min_max(&self) -> (u16, u16) {
        self.pix
            .iter()
            .fold((u16::MAX, u16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_spec_lengths() {
        let camera = CameraSpec::new(24, 32, 8);
        assert_eq!(camera.pixel_count(), 768);
        assert_eq!(camera.frame_len(), 1536);
    }

    #[test]
    fn test_camera_spec_default_is_mlx90640() {
        let camera = CameraSpec::default();
        assert_eq!((camera.rows, camera.columns), (24, 32));
    }

    #[test]
    fn test_same_geometry_ignores_fps() {
        let a = CameraSpec::new(2, 2, 8);
        let b = CameraSpec::new(2, 2, 4);
        assert!(a.same_geometry(&b));
        assert!(!a.same_geometry(&CameraSpec::new(2, 3, 8)));
    }

    #[test]
    fn test_telemetry_since_calibration() {
        let status = Telemetry {
            last_ffc_time: Duration::from_secs(1),
            time_on: Duration::from_secs(60),
        };
        assert_eq!(status.since_calibration(), Duration::from_secs(59));

        let backwards = Telemetry {
            last_ffc_time: Duration::from_secs(10),
            time_on: Duration::from_secs(5),
        };
        assert_eq!(backwards.since_calibration(), Duration::ZERO);
    }

    #[test]
    fn test_frame_get_set() {
        let mut frame = Frame::new(2, 3);
        frame.set(1, 2, 42);
        assert_eq!(frame.get(1, 2), 42);
        assert_eq!(frame.row(1), &[0, 0, 42]);
        assert_eq!(frame.pixels().len(), 6);
    }

    #[test]
    fn test_copy_from_is_deep() {
        let mut src = Frame::new(2, 2);
        src.fill(7);
        src.status.time_on = Duration::from_secs(3);

        let mut dst = Frame::new(2, 2);
        dst.copy_from(&src);
        src.set(0, 0, 99);

        assert_eq!(dst.get(0, 0), 7);
        assert_eq!(dst.status.time_on, Duration::from_secs(3));
    }

    #[test]
    fn test_copy_from_different_geometry() {
        let src = Frame::new(3, 4);
        let mut dst = Frame::new(1, 1);
        dst.copy_from(&src);
        assert_eq!(dst.rows(), 3);
        assert_eq!(dst.columns(), 4);
        assert_eq!(dst.pixels().len(), 12);
    }

    #[test]
    fn test_min_max() {
        let mut frame = Frame::new(2, 2);
        frame.pixels_mut().copy_from_slice(&[30_000, 29_000, 31_500, 30_100]);
        assert_eq!(frame.min_max(), (29_000, 31_500));
    }
}
