//! Recording sink and listener interfaces.
//!
//! The processor drives a [`RecordingSink`] that persists clips and notifies
//! an optional [`RecordingListener`] about motion and clip boundaries. Both
//! are injected at construction so storage and notification can be swapped
//! without touching the state machine.

use tracing::{debug, info};

use crate::error::Result;
use crate::frame::Frame;

/// Destination for recorded clips.
pub trait RecordingSink: Send {
    /// Check whether a new clip could be started (disk space, permissions).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SinkNotReady`] if recording is not possible.
    fn check_can_record(&mut self) -> Result<()>;

    /// Begin a new clip.
    ///
    /// `background` and `threshold` describe the motion detector state at the
    /// moment of the trigger.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SinkLifecycle`] if the clip cannot be created.
    fn start_recording(&mut self, background: &Frame, threshold: u16) -> Result<()>;

    /// Append a frame to the current clip.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SinkWrite`] if the frame could not be written.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Finalize the current clip.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SinkLifecycle`] if finalizing fails.
    fn stop_recording(&mut self) -> Result<()>;

    /// Throw away a clip whose start could not be completed.
    ///
    /// Called instead of [`stop_recording`](Self::stop_recording) when the
    /// pre-trigger frames could not be written. The default finalizes the clip
    /// as usual.
    ///
    /// # Errors
    ///
    /// Returns an error if the partial clip could not be cleaned up.
    fn abort_recording(&mut self) -> Result<()> {
        self.stop_recording()
    }
}

/// Observer of recording events. Notifications are fire-and-forget.
pub trait RecordingListener: Send {
    /// Motion was detected in a frame.
    fn motion_detected(&mut self);

    /// A clip was started.
    fn recording_started(&mut self);

    /// A clip was finished.
    fn recording_ended(&mut self);
}

/// A listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl RecordingListener for NullListener {
    fn motion_detected(&mut self) {}

    fn recording_started(&mut self) {}

    fn recording_ended(&mut self) {}
}

/// A listener that logs notifications and counts motion frames per clip.
#[derive(Debug, Clone, Default)]
pub struct TracingListener {
    motion_frames: u64,
    clips: u64,
}

impl TracingListener {
    /// Create a new listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clips started so far.
    #[must_use]
    pub fn clips(&self) -> u64 {
        self.clips
    }
}

impl RecordingListener for TracingListener {
    fn motion_detected(&mut self) {
        self.motion_frames += 1;
        debug!("Motion detected");
    }

    fn recording_started(&mut self) {
        self.clips += 1;
        info!(clip = self.clips, "Recording started");
    }

    fn recording_ended(&mut self) {
        info!(
            clip = self.clips,
            motion_frames = self.motion_frames,
            "Recording ended"
        );
        self.motion_frames = 0;
    }
}
