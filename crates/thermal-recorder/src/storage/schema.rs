//! `SQLite` schema for the clip index.
//!
//! Schema changes are expressed as an ordered list of migrations. Each entry
//! in [`MIGRATIONS`] moves the database up one version.

/// Clips table as first shipped.
pub const CREATE_CLIPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS clips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    frames INTEGER NOT NULL,
    threshold INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Index for listing clips newest first and pruning by age.
pub const CREATE_STARTED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_clips_started_at ON clips(started_at DESC)
";

/// Version 2: content digest of the finished clip file.
pub const ADD_DIGEST_COLUMN: &str = r"
ALTER TABLE clips ADD COLUMN digest TEXT
";

/// Index for looking clips up by digest.
pub const CREATE_DIGEST_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_clips_digest ON clips(digest)
";

/// Migrations in order. Applying entry `n` yields schema version `n + 1`.
pub const MIGRATIONS: &[&[&str]] = &[
    &[CREATE_CLIPS_TABLE, CREATE_STARTED_INDEX],
    &[ADD_DIGEST_COLUMN, CREATE_DIGEST_INDEX],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_not_empty() {
        assert!(!MIGRATIONS.is_empty());
        for statements in MIGRATIONS {
            assert!(!statements.is_empty());
            assert!(statements.iter().all(|s| !s.trim().is_empty()));
        }
    }

    #[test]
    fn test_clips_table_columns() {
        assert!(CREATE_CLIPS_TABLE.contains("id INTEGER PRIMARY KEY"));
        assert!(CREATE_CLIPS_TABLE.contains("started_at TEXT NOT NULL"));
        assert!(CREATE_CLIPS_TABLE.contains("path TEXT NOT NULL UNIQUE"));
        assert!(CREATE_CLIPS_TABLE.contains("frames INTEGER NOT NULL"));
    }
}
