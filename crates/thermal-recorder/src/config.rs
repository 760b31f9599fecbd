//! Configuration management for thermal-recorder.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::active_area::{ActiveAreaMask, Point, DEFAULT_POINTS};
use crate::decode::RawFormat;
use crate::error::{Error, Result};
use crate::frame::CameraSpec;
use crate::motion::DetectorKind;
use crate::window::{parse_time_of_day, RecordingWindow, WindowBound};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "thermal-recorder";

/// Default clip index file name.
const DATABASE_FILE_NAME: &str = "clips.db";

/// Default clip directory name inside the data directory.
const CLIP_DIR_NAME: &str = "clips";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `THERMAL_RECORDER_`, sections
///    separated by `__`, e.g. `THERMAL_RECORDER_CAMERA__FPS=9`)
/// 2. TOML config file at `~/.config/thermal-recorder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sensor geometry and raw format.
    pub camera: CameraConfig,
    /// Clip duration limits, output and recording window.
    pub recorder: RecorderConfig,
    /// Motion detection tuning.
    pub motion: MotionConfig,
    /// Device location and precomputed sun times.
    pub location: LocationConfig,
    /// Logging behaviour.
    pub logging: LoggingConfig,
}

/// Sensor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Number of pixel rows.
    pub rows: usize,
    /// Number of pixel columns.
    pub columns: usize,
    /// Frames delivered per second.
    pub fps: u32,
    /// Byte layout of raw frames.
    pub raw_format: RawFormat,
}

/// Recorder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Minimum clip length in seconds after the last motion.
    pub min_secs: u32,
    /// Maximum clip length in seconds.
    pub max_secs: u32,
    /// Seconds of footage kept from before the trigger.
    pub preview_secs: u32,
    /// Directory clips are written to.
    /// Defaults to `~/.local/share/thermal-recorder/clips`
    pub output_dir: Option<PathBuf>,
    /// Path to the clip index database.
    /// Defaults to `~/.local/share/thermal-recorder/clips.db`
    pub database_path: Option<PathBuf>,
    /// Refuse to start clips when less free space than this remains.
    pub min_disk_space_mb: u64,
    /// Time of day during which new clips may start.
    pub window: WindowConfig,
}

/// Recording window bounds.
///
/// Each bound is either empty, a time of day (`"21:30"`) or an offset from
/// sunrise or sunset (`"sunset-30m"`, `"sunrise+1h"`). Both empty means
/// recording is always permitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// When the window opens.
    pub start: String,
    /// When the window closes.
    pub end: String,
}

/// Motion detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Which detection algorithm to run.
    pub detector: DetectorKind,
    /// Consecutive motion frames required before a clip starts.
    pub trigger_frames: usize,
    /// Minimum code a cell must reach to count as a warm object.
    pub temp_thresh: u16,
    /// Minimum difference from the background for a cell to count as moving.
    pub delta_thresh: u16,
    /// Number of moving cells that constitutes motion.
    pub count_thresh: usize,
    /// Raise the temperature threshold above a warm background.
    pub dynamic_threshold: bool,
    /// Only cells warmer than the background count as moving.
    pub warmer_only: bool,
    /// Rate at which the background warms up (higher is slower).
    pub background_decay: u16,
    /// Minimum max-min spread for the contrast detector.
    pub contrast_thresh: u16,
    /// Ignore frames captured this soon after a sensor calibration.
    pub calibration_guard_secs: u64,
    /// Observation zone.
    pub active_area: ActiveAreaConfig,
}

/// Observation zone configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveAreaConfig {
    /// Restrict detection to the zone. When disabled every cell is active.
    pub enabled: bool,
    /// The four corners forming two triangles `(p1, p2, p3)` and `(p2, p3, p4)`.
    pub points: [Point; 4],
}

/// Location configuration used to resolve sunrise and sunset bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Precomputed local sunrise time (`HH:MM`).
    pub sunrise: Option<String>,
    /// Precomputed local sunset time (`HH:MM`).
    pub sunset: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum seconds between repeated warnings of the same kind.
    pub min_log_interval_secs: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            columns: 32,
            fps: 8,
            raw_format: RawFormat::U16Le,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            min_secs: 10,
            max_secs: 600,
            preview_secs: 3,
            output_dir: None, // Will be resolved to default at runtime
            database_path: None,
            min_disk_space_mb: 200,
            window: WindowConfig::default(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Background,
            trigger_frames: 2,
            temp_thresh: 29_815, // 25 C in centi-Kelvin
            delta_thresh: 150,
            count_thresh: 3,
            dynamic_threshold: true,
            warmer_only: true,
            background_decay: 32,
            contrast_thresh: 4000,
            calibration_guard_secs: 10,
            active_area: ActiveAreaConfig::default(),
        }
    }
}

impl Default for ActiveAreaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            points: DEFAULT_POINTS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_log_interval_secs: 60,
        }
    }
}

impl CameraConfig {
    /// The sensor geometry and cadence.
    #[must_use]
    pub fn spec(&self) -> CameraSpec {
        CameraSpec::new(self.rows, self.columns, self.fps)
    }
}

impl RecorderConfig {
    /// Minimum clip length in frames.
    #[must_use]
    pub fn min_frames(&self, fps: u32) -> usize {
        (self.min_secs * fps) as usize
    }

    /// Maximum clip length in frames.
    #[must_use]
    pub fn max_frames(&self, fps: u32) -> usize {
        (self.max_secs * fps) as usize
    }

    /// Pre-trigger footage in frames.
    #[must_use]
    pub fn preview_frames(&self, fps: u32) -> usize {
        (self.preview_secs * fps) as usize
    }
}

impl ActiveAreaConfig {
    /// Build the mask for the given geometry.
    #[must_use]
    pub fn build_mask(&self, camera: &CameraSpec) -> ActiveAreaMask {
        if self.enabled {
            ActiveAreaMask::from_points(camera.rows, camera.columns, &self.points)
        } else {
            ActiveAreaMask::full(camera.rows, camera.columns)
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `THERMAL_RECORDER_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("THERMAL_RECORDER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::ConfigValidation { message });

        if self.camera.rows == 0 || self.camera.columns == 0 {
            return invalid("camera rows and columns must be greater than 0".to_string());
        }
        if self.camera.fps == 0 {
            return invalid("camera fps must be greater than 0".to_string());
        }

        if self.recorder.max_secs == 0 {
            return invalid("max_secs must be greater than 0".to_string());
        }
        if self.recorder.min_secs > self.recorder.max_secs {
            return invalid(format!(
                "min_secs ({}) cannot be greater than max_secs ({})",
                self.recorder.min_secs, self.recorder.max_secs
            ));
        }

        if self.motion.trigger_frames == 0 {
            return invalid("trigger_frames must be greater than 0".to_string());
        }
        if self.motion.background_decay == 0 {
            return invalid("background_decay must be greater than 0".to_string());
        }

        if self.max_frames() <= self.history_capacity() {
            return invalid(format!(
                "max_secs ({}) must exceed the pre-trigger history of {} frames",
                self.recorder.max_secs,
                self.history_capacity()
            ));
        }

        WindowBound::parse(&self.recorder.window.start)?;
        WindowBound::parse(&self.recorder.window.end)?;
        for time in [&self.location.sunrise, &self.location.sunset]
            .into_iter()
            .flatten()
        {
            parse_time_of_day(time)?;
        }

        Ok(())
    }

    /// The sensor geometry and cadence.
    #[must_use]
    pub fn camera_spec(&self) -> CameraSpec {
        self.camera.spec()
    }

    /// Length in bytes of one raw sensor frame.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.camera_spec().frame_len()
    }

    /// Minimum clip length in frames.
    #[must_use]
    pub fn min_frames(&self) -> usize {
        self.recorder.min_frames(self.camera.fps)
    }

    /// Maximum clip length in frames.
    #[must_use]
    pub fn max_frames(&self) -> usize {
        self.recorder.max_frames(self.camera.fps)
    }

    /// Pre-trigger footage in frames.
    #[must_use]
    pub fn preview_frames(&self) -> usize {
        self.recorder.preview_frames(self.camera.fps)
    }

    /// Number of frames the pre-trigger history holds.
    #[must_use]
    pub fn history_capacity(&self) -> usize {
        self.preview_frames() + self.motion.trigger_frames
    }

    /// Build the recording window from the recorder and location sections.
    ///
    /// # Errors
    ///
    /// Returns an error if a window bound or sun time cannot be parsed.
    pub fn recording_window(&self) -> Result<RecordingWindow> {
        RecordingWindow::from_config(&self.recorder.window, &self.location)
    }

    /// Get the clip directory, resolving defaults if not set.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.recorder
            .output_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(CLIP_DIR_NAME))
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.recorder
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the minimum interval between repeated warnings.
    #[must_use]
    pub fn min_log_interval(&self) -> Duration {
        Duration::from_secs(self.logging.min_log_interval_secs)
    }

    /// Get the calibration guard as a Duration.
    #[must_use]
    pub fn calibration_guard(&self) -> Duration {
        Duration::from_secs(self.motion.calibration_guard_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.camera.rows, 24);
        assert_eq!(config.camera.columns, 32);
        assert_eq!(config.camera.raw_format, RawFormat::U16Le);
        assert_eq!(config.motion.detector, DetectorKind::Background);
        assert!(config.motion.active_area.enabled);
    }

    #[test]
    fn test_default_frame_counts() {
        let config = Config::default();

        assert_eq!(config.min_frames(), 80);
        assert_eq!(config.max_frames(), 4800);
        assert_eq!(config.preview_frames(), 24);
        assert_eq!(config.history_capacity(), 26);
        assert_eq!(config.frame_len(), 1536);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_fps() {
        let mut config = Config::default();
        config.camera.fps = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("fps"));
    }

    #[test]
    fn test_validate_zero_geometry() {
        let mut config = Config::default();
        config.camera.columns = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("columns"));
    }

    #[test]
    fn test_validate_min_greater_than_max() {
        let mut config = Config::default();
        config.recorder.min_secs = 700;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("min_secs"));
    }

    #[test]
    fn test_validate_zero_trigger_frames() {
        let mut config = Config::default();
        config.motion.trigger_frames = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("trigger_frames"));
    }

    #[test]
    fn test_validate_history_longer_than_clip() {
        let mut config = Config::default();
        config.recorder.min_secs = 1;
        config.recorder.max_secs = 2;
        config.recorder.preview_secs = 5;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("pre-trigger history"));
    }

    #[test]
    fn test_validate_bad_window() {
        let mut config = Config::default();
        config.recorder.window.start = "half past nine".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_sunrise() {
        let mut config = Config::default();
        config.location.sunrise = Some("25:99".to_string());

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_area_disabled_is_full() {
        let mut config = Config::default();
        config.motion.active_area.enabled = false;
        let mask = config.motion.active_area.build_mask(&config.camera_spec());

        assert_eq!(mask.active_count(), 24 * 32);
    }

    #[test]
    fn test_active_area_default_is_partial() {
        let config = Config::default();
        let mask = config.motion.active_area.build_mask(&config.camera_spec());

        assert!(mask.active_count() > 0);
        assert!(mask.active_count() < 24 * 32);
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("clips.db"));
    }

    #[test]
    fn test_output_dir_custom() {
        let mut config = Config::default();
        config.recorder.output_dir = Some(PathBuf::from("/var/lib/thermal/clips"));

        assert_eq!(config.output_dir(), PathBuf::from("/var/lib/thermal/clips"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.min_log_interval(), Duration::from_secs(60));
        assert_eq!(config.calibration_guard(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("thermal-recorder"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [camera]
            fps = 4
            raw_format = "f16_le"

            [recorder]
            min_secs = 5
            window = { start = "sunset-30m", end = "sunrise+30m" }

            [motion]
            detector = "contrast"
            trigger_frames = 3
            "#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.camera.fps, 4);
        assert_eq!(config.camera.raw_format, RawFormat::F16Le);
        assert_eq!(config.min_frames(), 20);
        assert_eq!(config.motion.detector, DetectorKind::Contrast);
        assert_eq!(config.motion.trigger_frames, 3);
        assert_eq!(config.recorder.window.start, "sunset-30m");
        // Untouched sections keep their defaults.
        assert_eq!(config.camera.rows, 24);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[camera]\nfps = 0\n").unwrap();

        assert!(Config::load_from(Some(path)).is_err());
    }

    #[test]
    fn test_config_serialize() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("trigger_frames"));
        assert!(json.contains("\"u16_le\""));
    }
}
