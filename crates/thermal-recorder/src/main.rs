//! `thermalrec` - CLI for thermal-recorder
//!
//! This binary runs the motion-triggered recorder and provides commands for
//! inspecting the detection area, recorded clips and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use thermal_recorder::cli::run::{feed_frames, open_input, preview_line, FeedOptions};
use thermal_recorder::cli::{Cli, ClipsCommand, Command, ConfigCommand, RunCommand};
use thermal_recorder::history::RecentFrame;
use thermal_recorder::{init_logging, ClipWriter, Config, Processor, Storage, TracingListener};

/// How long to wait for the frame loop to close its clip after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    // `config validate --file` loads its own file and must not fail here.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        let path = file
            .clone()
            .or_else(|| cli.config.clone())
            .unwrap_or_else(Config::default_config_path);
        println!("Validating configuration: {}", path.display());
        match Config::load_from(Some(path)) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => println!("Configuration error: {e}"),
        }
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Run(cmd) => run(config, cmd).await,
        Command::Mask => {
            handle_mask(&config);
            Ok(())
        }
        Command::Clips(cmd) => handle_clips(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn run(config: Config, cmd: RunCommand) -> anyhow::Result<()> {
    let sink = ClipWriter::from_config(&config).context("failed to open clip index")?;
    let mut processor = Processor::new(&config, Box::new(sink))?
        .with_listener(Box::new(TracingListener::new()));

    let camera = config.camera_spec();
    let mask = config.motion.active_area.build_mask(&camera);
    info!(
        rows = camera.rows,
        columns = camera.columns,
        fps = camera.fps,
        active_cells = mask.active_count(),
        "Starting recorder"
    );
    info!("Active area:\n{mask}");

    let mut input = open_input(cmd.input_path().map(std::path::PathBuf::as_path))?;
    let options = FeedOptions {
        frame_len: config.frame_len(),
        pace: cmd
            .realtime
            .then(|| Duration::from_secs(1) / camera.fps.max(1)),
        log_interval: config.min_log_interval(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let preview = (cmd.preview_secs > 0).then(|| {
        tokio::spawn(preview_loop(
            processor.recent_frame_handle(),
            Duration::from_secs(cmd.preview_secs),
        ))
    });

    let worker_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || {
        feed_frames(&mut processor, &mut input, &options, &worker_stop)
    });

    let result = tokio::select! {
        joined = &mut worker => joined,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing open clip");
            stop.store(true, Ordering::Relaxed);
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Frame source is blocked, exiting without closing the clip");
                    if let Some(preview) = preview {
                        preview.abort();
                    }
                    return Ok(());
                }
            }
        }
    };

    if let Some(preview) = preview {
        preview.abort();
    }

    let stats = result.context("frame loop panicked")??;
    println!(
        "Processed {} frames ({} with errors)",
        stats.frames, stats.errors
    );
    Ok(())
}

async fn preview_loop(recent: RecentFrame, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if let Some(frame) = recent.snapshot() {
            info!(target: "thermal_recorder::preview", "{}", preview_line(&frame));
        }
    }
}

fn handle_mask(config: &Config) {
    let camera = config.camera_spec();
    let mask = config.motion.active_area.build_mask(&camera);
    print!("{mask}");
    println!(
        "{} of {} cells active",
        mask.active_count(),
        camera.pixel_count()
    );
}

fn handle_clips(config: &Config, cmd: &ClipsCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path())?;

    let mut removed = Vec::new();
    if let Some(days) = cmd.prune_days {
        removed.extend(storage.prune_older_than(chrono::Duration::days(i64::from(days)))?);
    }
    if let Some(keep) = cmd.keep {
        removed.extend(storage.prune_keep_recent(keep)?);
    }
    if let Some(id) = cmd.delete {
        match storage.get(id)? {
            Some(clip) if storage.delete(id)? => removed.push(clip.path),
            _ => println!("No clip with id {id}"),
        }
    }
    if cmd.prune_days.is_some() || cmd.keep.is_some() || cmd.delete.is_some() {
        remove_clip_files(&removed);
        println!(
            "Removed {} clips, {} remaining",
            removed.len(),
            storage.count()?
        );
    }

    if cmd.stats {
        let stats = storage.stats()?;
        if cmd.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Clips:        {}", stats.total_clips);
            println!("Frames:       {}", stats.total_frames);
            if let Some(oldest) = stats.oldest_clip {
                println!("Oldest:       {}", oldest.to_rfc3339());
            }
            if let Some(newest) = stats.newest_clip {
                println!("Newest:       {}", newest.to_rfc3339());
            }
            println!("Index size:   {} bytes", stats.db_size_bytes);
        }
        return Ok(());
    }

    let clips = storage.get_recent(cmd.limit)?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&clips)?);
        return Ok(());
    }

    if clips.is_empty() {
        println!("No clips recorded.");
        return Ok(());
    }
    println!("{:>6}  {:<25}  {:>7}  {:>6}  PATH", "ID", "STARTED", "SECONDS", "FRAMES");
    for clip in clips {
        println!(
            "{:>6}  {:<25}  {:>7}  {:>6}  {}",
            clip.id.unwrap_or_default(),
            clip.started_at.format("%Y-%m-%d %H:%M:%S"),
            clip.duration().num_seconds(),
            clip.frames,
            clip.path.display()
        );
    }
    Ok(())
}

fn remove_clip_files(paths: &[std::path::PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {e}", path.display()),
        }
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Camera]");
                println!(
                    "  Geometry:           {}x{} @ {} fps",
                    config.camera.rows, config.camera.columns, config.camera.fps
                );
                println!("  Raw format:         {}", config.camera.raw_format);
                println!();
                println!("[Recorder]");
                println!(
                    "  Clip length:        {}..{} s ({}..{} frames)",
                    config.recorder.min_secs,
                    config.recorder.max_secs,
                    config.min_frames(),
                    config.max_frames()
                );
                println!(
                    "  Pre-trigger:        {} s ({} frames)",
                    config.recorder.preview_secs,
                    config.preview_frames()
                );
                println!("  Output directory:   {}", config.output_dir().display());
                println!("  Clip index:         {}", config.database_path().display());
                println!(
                    "  Window:             {}",
                    describe_window(&config.recorder.window.start, &config.recorder.window.end)
                );
                println!();
                println!("[Motion]");
                println!("  Detector:           {:?}", config.motion.detector);
                println!("  Trigger frames:     {}", config.motion.trigger_frames);
                println!(
                    "  Active area:        {}",
                    if config.motion.active_area.enabled {
                        "enabled"
                    } else {
                        "whole frame"
                    }
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { .. } => {
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn describe_window(start: &str, end: &str) -> String {
    match (start.trim(), end.trim()) {
        ("", "") => "always".to_string(),
        (start, "") => format!("from {start} until midnight"),
        ("", end) => format!("from midnight until {end}"),
        (start, end) => format!("{start} to {end}"),
    }
}
