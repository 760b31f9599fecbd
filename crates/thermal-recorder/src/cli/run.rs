//! Frame loop behind `thermalrec run`.
//!
//! Frames arrive as fixed-length raw buffers on a byte stream (a capture
//! file, a FIFO fed by the sensor driver, or stdin). The loop is blocking and
//! is expected to run on a dedicated thread.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::decode::code_to_celsius;
use crate::error::Result;
use crate::frame::Frame;
use crate::logging::LogLimiter;
use crate::processor::Processor;

/// Settings for [`feed_frames`].
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    /// Bytes per raw frame.
    pub frame_len: usize,
    /// Minimum time between frames, for replaying captures in real time.
    pub pace: Option<Duration>,
    /// Minimum interval between repeated processing warnings.
    pub log_interval: Duration,
}

/// Counters from a finished frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Frames handed to the processor.
    pub frames: u64,
    /// Frames for which the processor reported an error.
    pub errors: u64,
    /// Bytes of an incomplete trailing frame that were discarded.
    pub partial_bytes: usize,
}

/// Open the frame source. `None` reads stdin.
///
/// # Errors
///
/// Returns an error if the file cannot be opened.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn Read + Send>> {
    match path {
        Some(path) => {
            info!("Reading frames from {}", path.display());
            Ok(Box::new(BufReader::new(File::open(path)?)))
        }
        None => {
            info!("Reading frames from stdin");
            Ok(Box::new(io::stdin()))
        }
    }
}

/// Fill `buf` from `input`, returning the number of bytes read.
///
/// Fewer than `buf.len()` bytes means the stream ended.
///
/// # Errors
///
/// Returns any read error other than an interrupted call.
pub fn read_frame<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Feed frames from `input` to `processor` until the stream ends or `stop`
/// is raised, then close any open clip.
///
/// Processing errors are counted and logged through a rate limiter; they do
/// not end the loop.
///
/// # Errors
///
/// Returns an error if reading the input fails or the final clip cannot be
/// closed.
pub fn feed_frames<R: Read + ?Sized>(
    processor: &mut Processor,
    input: &mut R,
    options: &FeedOptions,
    stop: &AtomicBool,
) -> Result<FeedStats> {
    let mut buf = vec![0u8; options.frame_len];
    let mut limiter = LogLimiter::new(options.log_interval);
    let mut stats = FeedStats::default();

    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        let read = read_frame(input, &mut buf)?;
        if read < buf.len() {
            if read > 0 {
                debug!(bytes = read, "Discarding incomplete trailing frame");
            }
            stats.partial_bytes = read;
            break;
        }

        stats.frames += 1;
        if let Err(err) = processor.process(&buf) {
            stats.errors += 1;
            limiter.warn(format_args!("Frame {}: {err}", stats.frames));
        }

        if let Some(rest) = options.pace.and_then(|p| p.checked_sub(started.elapsed())) {
            std::thread::sleep(rest);
        }
    }

    if let Err(err) = processor.stop_recording() {
        warn!(error = %err, "Failed to close final clip");
        return Err(err);
    }
    info!(
        frames = stats.frames,
        errors = stats.errors,
        "Frame source finished"
    );
    Ok(stats)
}

/// One-line temperature summary of a frame.
#[must_use]
pub fn preview_line(frame: &Frame) -> String {
    let (min, max) = frame.min_max();
    let pixels = frame.pixels();
    let mean = if pixels.is_empty() {
        0
    } else {
        let sum: u64 = pixels.iter().map(|v| u64::from(*v)).sum();
        (sum / pixels.len() as u64) as u16
    };
    format!(
        "min {:.1} C, max {:.1} C, mean {:.1} C",
        code_to_celsius(min),
        code_to_celsius(max),
        code_to_celsius(mean)
    )
}
