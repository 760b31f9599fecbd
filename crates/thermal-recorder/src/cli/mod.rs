//! Command-line interface for thermal-recorder.
//!
//! This module provides the CLI structure for the `thermalrec` binary and the
//! blocking frame loop behind `thermalrec run`.

mod commands;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ClipsCommand, ConfigCommand, RunCommand};

use crate::logging::Verbosity;

/// thermalrec - Motion-triggered thermal camera recorder
///
/// Reads raw frames from a low-resolution thermal sensor, detects warm moving
/// objects, and records clips with a few seconds of pre-trigger footage.
#[derive(Debug, Parser)]
#[command(name = "thermalrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process frames and record clips
    Run(RunCommand),

    /// Print the active detection area
    Mask,

    /// List or prune recorded clips
    Clips(ClipsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "thermalrec");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["thermalrec", "-q", "mask"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["thermalrec", "mask"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["thermalrec", "-v", "mask"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["thermalrec", "-vv", "mask"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&["thermalrec", "run", "--input", "/tmp/frames.raw", "--realtime"]);
        match cli.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.input, Some(PathBuf::from("/tmp/frames.raw")));
                assert!(cmd.realtime);
                assert_eq!(cmd.preview_secs, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_clips() {
        let cli = parse(&["thermalrec", "clips", "--limit", "5", "--json"]);
        match cli.command {
            Command::Clips(cmd) => {
                assert_eq!(cmd.limit, 5);
                assert!(cmd.json);
                assert!(cmd.prune_days.is_none());
                assert!(cmd.keep.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_clips_removal() {
        let cli = parse(&["thermalrec", "clips", "--keep", "50", "--delete", "7"]);
        match cli.command {
            Command::Clips(cmd) => {
                assert_eq!(cmd.keep, Some(50));
                assert_eq!(cmd.delete, Some(7));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["thermalrec", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["thermalrec", "-c", "/custom/config.toml", "mask"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
