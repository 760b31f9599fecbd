//! Clip files.
//!
//! [`ClipWriter`] is the [`RecordingSink`] used by the binary. Each clip is a
//! single uncompressed `.trc` file, little endian throughout:
//!
//! ```text
//! magic      b"TRC1"
//! rows       u16
//! columns    u16
//! fps        u16
//! threshold  u16
//! started_at i64   unix milliseconds
//! background rows * columns u16
//! frames     repeated { len: u32 (bytes), rows * columns u16 }
//! ```
//!
//! On finalize the file's BLAKE3 digest is computed and the clip is added to
//! the [`Storage`] index when one is attached. An aborted clip is deleted and
//! never indexed.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::sink::RecordingSink;
use crate::storage::{Clip, Storage};

/// Leading bytes of every clip file.
pub const CLIP_MAGIC: &[u8; 4] = b"TRC1";

/// File extension for clip files.
pub const CLIP_EXTENSION: &str = "trc";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Reports free space for the file system holding a path.
pub trait FreeSpace: Send + fmt::Debug {
    /// Available bytes, or `None` if it cannot be determined.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Free space as reported by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpace;

impl FreeSpace for DiskSpace {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let path = path.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(sysinfo::Disk::available_space)
    }
}

/// Writes clips to a directory and indexes them.
#[derive(Debug)]
pub struct ClipWriter {
    output_dir: PathBuf,
    fps: u32,
    min_free_bytes: u64,
    space: Box<dyn FreeSpace>,
    storage: Option<Storage>,
    current: Option<OpenClip>,
}

struct OpenClip {
    path: PathBuf,
    out: BufWriter<File>,
    hasher: blake3::Hasher,
    scratch: Vec<u8>,
    rows: usize,
    columns: usize,
    threshold: u16,
    started_at: DateTime<Utc>,
    frames: u64,
}

impl fmt::Debug for OpenClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenClip")
            .field("path", &self.path)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl OpenClip {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.hasher.update(bytes);
        Ok(())
    }

    fn write_pixels(&mut self, frame: &Frame, prefixed: bool) -> io::Result<()> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        if prefixed {
            let len = (frame.pixels().len() * 2) as u32;
            scratch.extend_from_slice(&len.to_le_bytes());
        }
        for pix in frame.pixels() {
            scratch.extend_from_slice(&pix.to_le_bytes());
        }
        let result = self.write_bytes(&scratch);
        self.scratch = scratch;
        result
    }
}

impl ClipWriter {
    /// Create a writer storing clips in `output_dir`.
    ///
    /// No free-space limit applies and nothing is indexed until configured.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            fps,
            min_free_bytes: 0,
            space: Box::new(DiskSpace),
            storage: None,
            current: None,
        }
    }

    /// Create a writer from configuration, opening the clip index.
    ///
    /// # Errors
    ///
    /// Returns an error if the clip index cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        Ok(Self::new(config.output_dir(), config.camera.fps)
            .with_min_free_bytes(config.recorder.min_disk_space_mb * BYTES_PER_MB)
            .with_storage(storage))
    }

    /// Index finished clips in `storage`.
    #[must_use]
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Refuse to start clips with less than `bytes` free.
    #[must_use]
    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    /// Replace the free space source.
    #[must_use]
    pub fn with_free_space(mut self, space: Box<dyn FreeSpace>) -> Self {
        self.space = space;
        self
    }

    /// The clip directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The clip index, if attached.
    #[must_use]
    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    /// Path of the clip being written, if any.
    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|clip| clip.path.as_path())
    }

    fn ensure_output_dir(&self) -> Result<()> {
        if !self.output_dir.exists() {
            std::fs::create_dir_all(&self.output_dir).map_err(|source| Error::DirectoryCreate {
                path: self.output_dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn create_file(&self, started_at: DateTime<Utc>) -> io::Result<(PathBuf, File)> {
        let stem = started_at.format("%Y%m%d-%H%M%S%.3f").to_string();
        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.{CLIP_EXTENSION}")
            } else {
                format!("{stem}-{attempt}.{CLIP_EXTENSION}")
            };
            let path = self.output_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => {
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn finalize(&self, mut clip: OpenClip) -> Result<Clip> {
        clip.out
            .flush()
            .map_err(|err| Error::sink_stop(format!("{}: {err}", clip.path.display())))?;
        let file = clip
            .out
            .into_inner()
            .map_err(|err| Error::sink_stop(format!("{}: {}", clip.path.display(), err.error())))?;
        file.sync_all()
            .map_err(|err| Error::sink_stop(format!("{}: {err}", clip.path.display())))?;

        let record = Clip {
            id: None,
            started_at: clip.started_at,
            ended_at: Utc::now(),
            path: clip.path,
            frames: clip.frames,
            threshold: clip.threshold,
            digest: Some(clip.hasher.finalize().to_hex().to_string()),
        };

        if let Some(storage) = &self.storage {
            storage
                .insert(&record)
                .map_err(|err| Error::sink_stop(format!("failed to index clip: {err}")))?;
        }
        Ok(record)
    }
}

impl RecordingSink for ClipWriter {
    fn check_can_record(&mut self) -> Result<()> {
        self.ensure_output_dir()
            .map_err(|err| Error::sink_not_ready(err.to_string()))?;

        match self.space.available_bytes(&self.output_dir) {
            Some(free) if free < self.min_free_bytes => Err(Error::sink_not_ready(format!(
                "only {} MB free in {}",
                free / BYTES_PER_MB,
                self.output_dir.display()
            ))),
            Some(_) => Ok(()),
            None => {
                debug!("Free space unknown for {}", self.output_dir.display());
                Ok(())
            }
        }
    }

    fn start_recording(&mut self, background: &Frame, threshold: u16) -> Result<()> {
        if self.current.is_some() {
            warn!("Clip still open at start, finalizing it");
            self.stop_recording()?;
        }
        self.ensure_output_dir()
            .map_err(|err| Error::sink_start(err.to_string()))?;

        let started_at = Utc::now();
        let (path, file) = self
            .create_file(started_at)
            .map_err(|err| Error::sink_start(format!("{}: {err}", self.output_dir.display())))?;

        let mut clip = OpenClip {
            path,
            out: BufWriter::new(file),
            hasher: blake3::Hasher::new(),
            scratch: Vec::with_capacity(background.pixels().len() * 2 + 4),
            rows: background.rows(),
            columns: background.columns(),
            threshold,
            started_at,
            frames: 0,
        };

        let mut header = Vec::with_capacity(20);
        header.extend_from_slice(CLIP_MAGIC);
        header.extend_from_slice(&(clip.rows as u16).to_le_bytes());
        header.extend_from_slice(&(clip.columns as u16).to_le_bytes());
        header.extend_from_slice(&(self.fps as u16).to_le_bytes());
        header.extend_from_slice(&threshold.to_le_bytes());
        header.extend_from_slice(&started_at.timestamp_millis().to_le_bytes());

        clip.write_bytes(&header)
            .and_then(|()| clip.write_pixels(background, false))
            .map_err(|err| Error::sink_start(format!("{}: {err}", clip.path.display())))?;

        info!(path = %clip.path.display(), "Clip opened");
        self.current = Some(clip);
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let clip = self
            .current
            .as_mut()
            .ok_or_else(|| Error::sink_write("no clip open"))?;

        if frame.rows() != clip.rows || frame.columns() != clip.columns {
            return Err(Error::sink_write(format!(
                "frame is {}x{}, clip is {}x{}",
                frame.rows(),
                frame.columns(),
                clip.rows,
                clip.columns
            )));
        }

        clip.write_pixels(frame, true)
            .map_err(|err| Error::sink_write(format!("{}: {err}", clip.path.display())))?;
        clip.frames += 1;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        let Some(clip) = self.current.take() else {
            return Ok(());
        };
        let record = self.finalize(clip)?;
        info!(
            path = %record.path.display(),
            frames = record.frames,
            "Clip finished"
        );
        Ok(())
    }

    fn abort_recording(&mut self) -> Result<()> {
        let Some(clip) = self.current.take() else {
            return Ok(());
        };
        let OpenClip { path, out, .. } = clip;
        drop(out);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(Error::sink_stop(format!("{}: {err}", path.display())));
            }
        }
        info!(path = %path.display(), "Clip discarded");
        Ok(())
    }
}

/// A clip file read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFile {
    /// Frames per second at capture time.
    pub fps: u16,
    /// Detector threshold at the trigger.
    pub threshold: u16,
    /// Start time in unix milliseconds.
    pub started_at_ms: i64,
    /// Background frame at the trigger.
    pub background: Frame,
    /// Recorded frames, pre-trigger frames first.
    pub frames: Vec<Frame>,
}

impl ClipFile {
    /// Read and parse a clip file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut bytes)?;
        Self::parse(&bytes)
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor { bytes, pos: 0 };
        if cursor.take(4)? != CLIP_MAGIC {
            return Err(Error::UnsupportedFormat("not a clip file".to_string()));
        }
        let rows = usize::from(cursor.u16()?);
        let columns = usize::from(cursor.u16()?);
        let fps = cursor.u16()?;
        let threshold = cursor.u16()?;
        let started_at_ms = i64::from_le_bytes(cursor.array()?);

        let mut background = Frame::new(rows, columns);
        cursor.pixels(&mut background)?;

        let mut frames = Vec::new();
        while cursor.remaining() > 0 {
            let len = u32::from_le_bytes(cursor.array()?) as usize;
            if len != rows * columns * 2 {
                return Err(Error::Decode {
                    expected: rows * columns * 2,
                    actual: len,
                });
            }
            let mut frame = Frame::new(rows, columns);
            cursor.pixels(&mut frame)?;
            frames.push(frame);
        }

        Ok(Self {
            fps,
            threshold,
            started_at_ms,
            background,
            frames,
        })
    }
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Decode {
                expected: n,
                actual: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn pixels(&mut self, frame: &mut Frame) -> Result<()> {
        for pix in frame.pixels_mut() {
            *pix = self.u16()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct FixedSpace(Option<u64>);

    impl FreeSpace for FixedSpace {
        fn available_bytes(&self, _path: &Path) -> Option<u64> {
            self.0
        }
    }

    fn frame(value: u16) -> Frame {
        let mut frame = Frame::new(2, 3);
        frame.fill(value);
        frame
    }

    fn writer(dir: &TempDir) -> ClipWriter {
        ClipWriter::new(dir.path().join("clips"), 8)
            .with_free_space(Box::new(FixedSpace(Some(u64::MAX))))
            .with_storage(Storage::open_in_memory().unwrap())
    }

    #[test]
    fn test_clip_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);

        writer.check_can_record().unwrap();
        writer.start_recording(&frame(100), 29_815).unwrap();
        let path = writer.current_path().unwrap().to_path_buf();
        for v in 1..=3 {
            writer.write_frame(&frame(v)).unwrap();
        }
        writer.stop_recording().unwrap();
        assert!(writer.current_path().is_none());

        let clip = ClipFile::read(&path).unwrap();
        assert_eq!(clip.fps, 8);
        assert_eq!(clip.threshold, 29_815);
        assert_eq!(clip.background, frame(100));
        assert_eq!(clip.frames, vec![frame(1), frame(2), frame(3)]);
        assert_eq!(path.extension().unwrap(), CLIP_EXTENSION);
    }

    #[test]
    fn test_aborted_clip_is_removed_and_not_indexed() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);

        writer.start_recording(&frame(100), 29_815).unwrap();
        let path = writer.current_path().unwrap().to_path_buf();
        writer.write_frame(&frame(1)).unwrap();
        writer.abort_recording().unwrap();

        assert!(writer.current_path().is_none());
        assert!(!path.exists());
        assert_eq!(writer.storage().unwrap().count().unwrap(), 0);

        // Aborting with nothing open is a no-op.
        writer.abort_recording().unwrap();
    }

    #[test]
    fn test_finished_clip_is_indexed_with_digest() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);

        writer.start_recording(&frame(0), 1).unwrap();
        writer.write_frame(&frame(5)).unwrap();
        let path = writer.current_path().unwrap().to_path_buf();
        writer.stop_recording().unwrap();

        let storage = writer.storage().unwrap();
        let clips = storage.get_recent(10).unwrap();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].path, path);
        assert_eq!(clips[0].frames, 1);

        let bytes = std::fs::read(&path).unwrap();
        let expected = blake3::hash(&bytes).to_hex().to_string();
        assert_eq!(clips[0].digest.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_not_ready_when_disk_is_full() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir)
            .with_min_free_bytes(200 * BYTES_PER_MB)
            .with_free_space(Box::new(FixedSpace(Some(10 * BYTES_PER_MB))));

        let err = writer.check_can_record().unwrap_err();
        assert!(matches!(err, Error::SinkNotReady { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unknown_free_space_allows_recording() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir)
            .with_min_free_bytes(u64::MAX)
            .with_free_space(Box::new(FixedSpace(None)));
        assert!(writer.check_can_record().is_ok());
        assert!(writer.output_dir().exists());
    }

    #[test]
    fn test_write_without_clip_fails() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);
        let err = writer.write_frame(&frame(1)).unwrap_err();
        assert!(matches!(err, Error::SinkWrite { .. }));
        assert!(writer.stop_recording().is_ok());
    }

    #[test]
    fn test_write_rejects_geometry_change() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);
        writer.start_recording(&frame(0), 1).unwrap();
        assert!(writer.write_frame(&Frame::new(3, 3)).is_err());
        writer.stop_recording().unwrap();
    }

    #[test]
    fn test_consecutive_clips_get_distinct_files() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);

        let mut paths = Vec::new();
        for _ in 0..3 {
            writer.start_recording(&frame(0), 1).unwrap();
            paths.push(writer.current_path().unwrap().to_path_buf());
            writer.stop_recording().unwrap();
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
        assert_eq!(writer.storage().unwrap().count().unwrap(), 3);
    }

    #[test]
    fn test_start_while_open_finalizes_previous() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);
        writer.start_recording(&frame(0), 1).unwrap();
        writer.start_recording(&frame(0), 1).unwrap();
        writer.stop_recording().unwrap();
        assert_eq!(writer.storage().unwrap().count().unwrap(), 2);
    }

    #[test]
    fn test_read_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.trc");
        std::fs::write(&path, b"RIFF....").unwrap();
        assert!(ClipFile::read(&path).is_err());
    }

    #[test]
    fn test_read_rejects_truncated_clip() {
        let dir = TempDir::new().unwrap();
        let mut writer = writer(&dir);
        writer.start_recording(&frame(0), 1).unwrap();
        writer.write_frame(&frame(1)).unwrap();
        let path = writer.current_path().unwrap().to_path_buf();
        writer.stop_recording().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
        assert!(ClipFile::read(&path).is_err());
    }
}
