//! Schema versioning for the clip index.
//!
//! The schema version lives in `PRAGMA user_version`. Pending migrations from
//! [`MIGRATIONS`] are applied one transaction per version, so a failure
//! leaves the database at the last version that applied cleanly.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Error, Result};

use super::schema::MIGRATIONS;

/// The schema version this build writes.
pub const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the database schema up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if the database was written by a newer build or a
/// migration fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    let applied = usize::try_from(version).unwrap_or(0);
    for (index, statements) in MIGRATIONS.iter().enumerate().skip(applied) {
        let target = index as i32 + 1;
        let tx = conn.unchecked_transaction()?;
        for statement in *statements {
            tx.execute_batch(statement)
                .map_err(|err| Error::DatabaseMigration {
                    message: format!("migration to version {target} failed: {err}"),
                })?;
        }
        set_schema_version(&tx, target)?;
        tx.commit()?;
        debug!(version = target, "Applied schema migration");
    }

    Ok(())
}

/// Read the schema version. A fresh database reports 0.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}
