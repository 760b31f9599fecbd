//! Motion-triggered recording state machine.
//!
//! [`Processor`] consumes one raw sensor frame at a time. Each frame is
//! decoded into the working slot of the [`FrameHistory`], run through the
//! motion [`Detector`], and, while a clip is open, written to the
//! [`RecordingSink`]. A clip opens after `trigger_frames` consecutive motion
//! frames, replays the buffered pre-trigger frames, and closes once the
//! number of frames written reaches the current end target. Every motion
//! frame pushes the target to `frames_written + min_frames`, capped at
//! `max_frames`.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::{Config, RecorderConfig};
use crate::decode::FrameDecoder;
use crate::error::{Error, Result};
use crate::frame::{CameraSpec, Frame};
use crate::history::{FrameHistory, RecentFrame};
use crate::logging::LogLimiter;
use crate::motion::{build_detector, Detector};
use crate::sink::{RecordingListener, RecordingSink};
use crate::window::RecordingWindow;

/// Coarse state of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No motion seen in the last frame and no clip open.
    Idle,
    /// Motion seen, waiting for enough consecutive frames or a ready sink.
    Accumulating,
    /// A clip is open.
    Recording,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Accumulating => "accumulating",
            Self::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Counters for the current clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    /// Whether a clip is open.
    pub is_recording: bool,
    /// Frames written to the open clip, pre-trigger replay included, so the
    /// replayed frames count toward the minimum and maximum clip length.
    pub frames_written: usize,
    /// The clip closes once `frames_written` reaches this value.
    pub write_until: usize,
    /// Consecutive frames with motion.
    pub triggered: usize,
}

/// Drives detection and recording for a single camera.
pub struct Processor {
    decoder: FrameDecoder,
    detector: Box<dyn Detector>,
    history: FrameHistory,
    window: RecordingWindow,
    sink: Box<dyn RecordingSink>,
    listener: Option<Box<dyn RecordingListener>>,
    camera: CameraSpec,
    recorder: RecorderConfig,
    trigger_frames: usize,
    min_frames: usize,
    max_frames: usize,
    session: Session,
    log: LogLimiter,
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("camera", &self.camera)
            .field("window", &self.window)
            .field("trigger_frames", &self.trigger_frames)
            .field("min_frames", &self.min_frames)
            .field("max_frames", &self.max_frames)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Processor {
    /// Build a processor from configuration.
    ///
    /// The detector and recording window are derived from `config`; use
    /// [`with_detector`](Self::with_detector) and
    /// [`with_window`](Self::with_window) to substitute them.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &Config, sink: Box<dyn RecordingSink>) -> Result<Self> {
        config.validate()?;
        let camera = config.camera_spec();
        let window = config.recording_window()?;
        if window.missing_sun_times() {
            warn!("Recording window uses sunrise or sunset but no sun times are configured; it stays closed");
        }

        Ok(Self {
            decoder: FrameDecoder::new(config.camera.raw_format),
            detector: build_detector(&config.motion, &camera),
            history: FrameHistory::new(config.history_capacity(), &camera),
            window,
            sink,
            listener: None,
            camera,
            recorder: config.recorder.clone(),
            trigger_frames: config.motion.trigger_frames,
            min_frames: config.min_frames(),
            max_frames: config.max_frames(),
            session: Session::default(),
            log: LogLimiter::new(config.min_log_interval()),
        })
    }

    /// Replace the motion detector.
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the recording window.
    #[must_use]
    pub fn with_window(mut self, window: RecordingWindow) -> Self {
        self.window = window;
        self
    }

    /// Attach a listener for motion and clip notifications.
    #[must_use]
    pub fn with_listener(mut self, listener: Box<dyn RecordingListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// The current coarse state.
    #[must_use]
    pub fn state(&self) -> RecorderState {
        if self.session.is_recording {
            RecorderState::Recording
        } else if self.session.triggered > 0 {
            RecorderState::Accumulating
        } else {
            RecorderState::Idle
        }
    }

    /// Counters for the current clip.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session
    }

    /// The camera the processor is configured for.
    #[must_use]
    pub fn camera(&self) -> CameraSpec {
        self.camera
    }

    /// The active motion detector.
    #[must_use]
    pub fn detector(&self) -> &dyn Detector {
        self.detector.as_ref()
    }

    /// Minimum and maximum clip length in frames.
    #[must_use]
    pub fn frame_limits(&self) -> (usize, usize) {
        (self.min_frames, self.max_frames)
    }

    /// A deep copy of the most recently processed frame.
    #[must_use]
    pub fn most_recent_copy(&self) -> Option<Frame> {
        self.history.most_recent_copy()
    }

    /// A handle that other threads can poll for the latest frame.
    #[must_use]
    pub fn recent_frame_handle(&self) -> RecentFrame {
        self.history.recent_handle()
    }

    /// Decode and process one raw sensor frame.
    ///
    /// A frame that fails to decode force-stops any open clip. Sink lifecycle
    /// failures are returned after the frame has been fully processed, so the
    /// pipeline keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] for malformed input, or the sink's error if
    /// starting, replaying or stopping a clip failed.
    pub fn process(&mut self, raw: &[u8]) -> Result<()> {
        if let Err(err) = self.decoder.decode(raw, self.history.current()) {
            if let Err(stop_err) = self.stop_recording() {
                self.log
                    .warn(format_args!("Failed to stop recording after bad frame: {stop_err}"));
            }
            return Err(err);
        }
        self.process_current()
    }

    /// Process an already decoded frame.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process), minus decoding.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<()> {
        self.history.current().copy_from(frame);
        self.process_current()
    }

    /// Stop the open clip, if any.
    ///
    /// The session is cleared and the history forgotten even when the sink
    /// fails to finalize.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if finalizing the clip failed.
    pub fn stop_recording(&mut self) -> Result<()> {
        if !self.session.is_recording {
            return Ok(());
        }

        if let Some(listener) = self.listener.as_mut() {
            listener.recording_ended();
        }
        let result = self.sink.stop_recording();
        info!(frames = self.session.frames_written, "Recording stopped");

        self.session = Session::default();
        self.history.reset_oldest();
        result
    }

    /// Reconfigure for a (possibly different) camera.
    ///
    /// Any open clip is stopped and the detector's background discarded. The
    /// history is rebuilt when the geometry or frame rate changes.
    pub fn reset(&mut self, camera: CameraSpec) {
        if let Err(err) = self.stop_recording() {
            warn!(error = %err, "Failed to stop recording during reset");
        }
        self.detector.reset(&camera);
        self.session = Session::default();

        let capacity = self.recorder.preview_frames(camera.fps) + self.trigger_frames;
        if self.camera.same_geometry(&camera) && capacity == self.history.capacity() {
            self.history.reset_oldest();
        } else {
            self.history = FrameHistory::with_recent(capacity, &camera, self.history.recent_handle());
        }

        self.min_frames = self.recorder.min_frames(camera.fps);
        self.max_frames = self.recorder.max_frames(camera.fps);
        if self.max_frames <= capacity {
            warn!(
                max_frames = self.max_frames,
                capacity, "Clip limit does not exceed history, pre-trigger footage will be cut"
            );
        }
        self.camera = camera;
        info!(
            rows = camera.rows,
            columns = camera.columns,
            fps = camera.fps,
            "Processor reset"
        );
    }

    fn process_current(&mut self) -> Result<()> {
        let mut outcome = Ok(());

        if self.detector.detect(self.history.current()) {
            if let Some(listener) = self.listener.as_mut() {
                listener.motion_detected();
            }
            self.session.triggered += 1;

            if self.session.is_recording {
                self.session.write_until = self.extend_target(self.session.frames_written);
            } else if self.session.triggered >= self.trigger_frames {
                match self.can_start_writing() {
                    Ok(()) => outcome = self.start_recording(),
                    Err(err) if err.is_recoverable() => {
                        self.log
                            .warn(format_args!("Recording not started: {err}"));
                    }
                    Err(err) => outcome = Err(err),
                }
            }
        } else {
            self.session.triggered = 0;
        }

        if self.session.is_recording {
            if let Err(err) = self.sink.write_frame(self.history.current()) {
                self.log.warn(format_args!("Failed to write frame: {err}"));
            }
            self.session.frames_written += 1;
        }

        self.history.advance();

        if self.session.is_recording && self.session.frames_written >= self.session.write_until {
            if let Err(err) = self.stop_recording() {
                outcome = outcome.and(Err(err));
            }
        }
        outcome
    }

    fn extend_target(&self, frames_written: usize) -> usize {
        (frames_written + self.min_frames).min(self.max_frames)
    }

    fn can_start_writing(&mut self) -> Result<()> {
        if !self.window.active() {
            return Err(Error::WindowClosed);
        }
        self.sink.check_can_record()
    }

    fn start_recording(&mut self) -> Result<()> {
        self.sink
            .start_recording(self.detector.background(), self.detector.threshold())?;

        // The current frame is written after the replay and must fit too.
        let history = self.history.history();
        let skip = history
            .len()
            .saturating_sub(self.max_frames.saturating_sub(1));
        let mut replayed = 0;
        for frame in history.skip(skip) {
            if let Err(err) = self.sink.write_frame(frame) {
                if let Err(abort_err) = self.sink.abort_recording() {
                    debug!(error = %abort_err, "Failed to discard aborted clip");
                }
                return Err(err);
            }
            replayed += 1;
        }

        self.session.is_recording = true;
        self.session.frames_written = replayed;
        self.session.write_until = self.extend_target(replayed);

        if let Some(listener) = self.listener.as_mut() {
            listener.recording_started();
        }
        info!(
            replayed,
            threshold = self.detector.threshold(),
            "Recording started"
        );
        Ok(())
    }
}
