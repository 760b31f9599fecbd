//! `thermal-recorder` - Motion-triggered recording for low-resolution thermal cameras
//!
//! This library decodes raw sensor frames, detects warm moving objects inside
//! an observation zone, and records clips that include a few seconds of
//! footage from before the trigger.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod active_area;
pub mod cli;
pub mod clip;
pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod history;
pub mod logging;
pub mod motion;
pub mod processor;
pub mod sink;
pub mod storage;
pub mod window;

pub use active_area::{ActiveAreaMask, Point};
pub use clip::ClipWriter;
pub use config::Config;
pub use decode::{FrameDecoder, RawFormat};
pub use error::{Error, Result};
pub use frame::{CameraSpec, Frame, Telemetry};
pub use history::FrameHistory;
pub use logging::init_logging;
pub use motion::{ContrastDetector, Detector, DetectorKind, MotionDetector};
pub use processor::{Processor, RecorderState};
pub use sink::{NullListener, RecordingListener, RecordingSink, TracingListener};
pub use storage::{Clip, ClipStats, Storage};
pub use window::RecordingWindow;
