//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Arguments for the recording loop.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Raw frame source: a file or FIFO. Reads stdin when omitted or `-`.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Pace frames at the configured camera rate (for replaying files)
    #[arg(long)]
    pub realtime: bool,

    /// Seconds between preview log lines, 0 to disable
    #[arg(long, value_name = "SECS", default_value = "5")]
    pub preview_secs: u64,
}

impl RunCommand {
    /// The input path, or `None` for stdin.
    #[must_use]
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|p| p.as_os_str() != "-")
    }
}

/// Arguments for listing and pruning clips.
#[derive(Debug, Args)]
pub struct ClipsCommand {
    /// Maximum number of clips to list
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Delete clips (index entries and files) older than this many days
    #[arg(long, value_name = "DAYS")]
    pub prune_days: Option<u32>,

    /// Delete all but the most recent N clips (index entries and files)
    #[arg(long, value_name = "N")]
    pub keep: Option<usize>,

    /// Delete a single clip by id (index entry and file)
    #[arg(long, value_name = "ID")]
    pub delete: Option<i64>,

    /// Show index statistics instead of the clip list
    #[arg(long)]
    pub stats: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
