//! Clip index.
//!
//! Finished clips are recorded in a small `SQLite` database so they can be
//! listed and pruned without scanning the clip directory.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

const CLIP_COLUMNS: &str = "id, started_at, ended_at, path, frames, threshold, digest";

/// A finished clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    /// Row id, `None` until inserted.
    pub id: Option<i64>,
    /// When the clip was started.
    pub started_at: DateTime<Utc>,
    /// When the clip was finalized.
    pub ended_at: DateTime<Utc>,
    /// Location of the clip file.
    pub path: PathBuf,
    /// Number of frames in the clip, pre-trigger frames included.
    pub frames: u64,
    /// Detector threshold at the time of the trigger.
    pub threshold: u16,
    /// Hex blake3 digest of the clip file.
    pub digest: Option<String>,
}

impl Clip {
    /// Clip length as wall-clock time.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }
}

/// Persistent clip index.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open or create the index at the given path.
    ///
    /// Creates the parent directories if they don't exist and brings the
    /// schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening clip index at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Clip index opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory index for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a finished clip and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including when a
    /// clip with the same path is already indexed.
    pub fn insert(&self, clip: &Clip) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO clips (started_at, ended_at, path, frames, threshold, digest)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                clip.started_at.to_rfc3339(),
                clip.ended_at.to_rfc3339(),
                clip.path.to_string_lossy(),
                i64::try_from(clip.frames).unwrap_or(i64::MAX),
                clip.threshold,
                clip.digest,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, frames = clip.frames, "Indexed clip");
        Ok(id)
    }

    /// Get a clip by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: i64) -> Result<Option<Clip>> {
        let clip = self
            .conn
            .query_row(
                &format!("SELECT {CLIP_COLUMNS} FROM clips WHERE id = ?1"),
                [id],
                Self::row_to_clip,
            )
            .optional()?;
        Ok(clip)
    }

    /// Get the most recently started clips, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<Clip>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLIP_COLUMNS} FROM clips ORDER BY started_at DESC, id DESC LIMIT ?1"
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let clips = stmt
            .query_map([limit], Self::row_to_clip)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(clips)
    }

    /// Count indexed clips.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM clips", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove a clip from the index.
    ///
    /// Returns `true` if a clip was removed. The clip file is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM clips WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Remove clips started more than `max_age` ago.
    ///
    /// Returns the paths of the removed clips so the caller can delete the
    /// files.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<Vec<PathBuf>> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let paths = self.delete_returning_paths("started_at < ?1", [cutoff])?;

        if !paths.is_empty() {
            info!("Pruned {} old clips", paths.len());
        }
        Ok(paths)
    }

    /// Keep only the `keep_count` most recent clips.
    ///
    /// Returns the paths of the removed clips.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_keep_recent(&self, keep_count: usize) -> Result<Vec<PathBuf>> {
        let keep = i64::try_from(keep_count).unwrap_or(i64::MAX);
        let paths = self.delete_returning_paths(
            "id NOT IN (SELECT id FROM clips ORDER BY started_at DESC, id DESC LIMIT ?1)",
            [keep],
        )?;

        if !paths.is_empty() {
            info!("Pruned {} clips to keep {} recent", paths.len(), keep_count);
        }
        Ok(paths)
    }

    /// Get index statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<ClipStats> {
        let (total_clips, total_frames, oldest, newest): (
            i64,
            Option<i64>,
            Option<String>,
            Option<String>,
        ) = self.conn.query_row(
            "SELECT COUNT(*), SUM(frames), MIN(started_at), MAX(started_at) FROM clips",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let parse = |s: Option<String>| {
            s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(ClipStats {
            total_clips,
            total_frames: total_frames.and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
            oldest_clip: parse(oldest),
            newest_clip: parse(newest),
            db_size_bytes,
        })
    }

    fn delete_returning_paths<P: rusqlite::Params + Clone>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<PathBuf>> {
        let tx = self.conn.unchecked_transaction()?;
        let paths = {
            let mut stmt = tx.prepare(&format!("SELECT path FROM clips WHERE {filter}"))?;
            let paths = stmt
                .query_map(params.clone(), |row| row.get::<_, String>(0))?
                .map(|path| path.map(PathBuf::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            paths
        };
        tx.execute(&format!("DELETE FROM clips WHERE {filter}"), params)?;
        tx.commit()?;
        Ok(paths)
    }

    fn row_to_clip(row: &rusqlite::Row) -> rusqlite::Result<Clip> {
        let timestamp = |idx: usize| -> rusqlite::Result<DateTime<Utc>> {
            let value: String = row.get(idx)?;
            DateTime::parse_from_rfc3339(&value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        rusqlite::types::Type::Text,
                        Box::new(err),
                    )
                })
        };
        let path: String = row.get(3)?;
        let frames: i64 = row.get(4)?;

        Ok(Clip {
            id: Some(row.get(0)?),
            started_at: timestamp(1)?,
            ended_at: timestamp(2)?,
            path: PathBuf::from(path),
            frames: u64::try_from(frames).unwrap_or(0),
            threshold: row.get(5)?,
            digest: row.get(6)?,
        })
    }
}

/// Statistics about the clip index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipStats {
    /// Number of indexed clips.
    pub total_clips: i64,
    /// Frames across all clips.
    pub total_frames: u64,
    /// Start of the oldest clip.
    pub oldest_clip: Option<DateTime<Utc>>,
    /// Start of the newest clip.
    pub newest_clip: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
