//! Error types for thermal-recorder.
//!
//! This module defines all error types used throughout the recorder, from raw
//! frame decoding through the recording sink lifecycle to configuration and
//! clip index storage.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for thermal-recorder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Frame Errors ===
    /// The raw sensor buffer is too short for the configured geometry.
    #[error("raw frame too short: expected {expected} bytes, got {actual}")]
    Decode {
        /// Number of bytes the frame geometry requires.
        expected: usize,
        /// Number of bytes that were supplied.
        actual: usize,
    },

    /// The configured raw format is not one the decoder understands.
    #[error("unsupported raw frame format: {0}")]
    UnsupportedFormat(String),

    // === Recording Errors ===
    /// Motion was detected outside of the permitted recording window.
    #[error("motion detected but outside of recording window")]
    WindowClosed,

    /// The recording sink refused to start a new clip.
    #[error("recorder not ready: {reason}")]
    SinkNotReady {
        /// Why the sink cannot record.
        reason: String,
    },

    /// Writing a frame to the active clip failed.
    #[error("failed to write frame: {message}")]
    SinkWrite {
        /// Description of what went wrong.
        message: String,
    },

    /// Starting or finalizing a clip failed.
    #[error("failed to {operation} recording: {message}")]
    SinkLifecycle {
        /// The lifecycle step that failed (`start` or `stop`).
        operation: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Storage Errors ===
    /// Failed to open or create the clip index database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A specialized Result type for thermal-recorder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a sink-not-ready error.
    #[must_use]
    pub fn sink_not_ready(reason: impl Into<String>) -> Self {
        Self::SinkNotReady {
            reason: reason.into(),
        }
    }

    /// Create a frame write error.
    #[must_use]
    pub fn sink_write(message: impl Into<String>) -> Self {
        Self::SinkWrite {
            message: message.into(),
        }
    }

    /// Create a clip start error.
    #[must_use]
    pub fn sink_start(message: impl Into<String>) -> Self {
        Self::SinkLifecycle {
            operation: "start",
            message: message.into(),
        }
    }

    /// Create a clip finalize error.
    #[must_use]
    pub fn sink_stop(message: impl Into<String>) -> Self {
        Self::SinkLifecycle {
            operation: "stop",
            message: message.into(),
        }
    }

    /// Check if this error came from decoding a raw frame.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::UnsupportedFormat(_))
    }

    /// Check if the pipeline can carry on after this error.
    ///
    /// Recoverable errors are logged through a rate limiter and retried on the
    /// next qualifying frame.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WindowClosed | Self::SinkNotReady { .. } | Self::SinkWrite { .. }
        )
    }
}
