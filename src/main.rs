//! Captureflow: records time-aligned desktop activity — input, screen video,
//! and window context — into a per-recording SQLite database and an H.264
//! video file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use captureflow_host::{record, RecordRequest};
use captureflow_storage::StorageConfig;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "captureflow", version, about = "Record time-aligned desktop activity")]
struct Cli {
    /// Path to a config file layered over defaults and `CAPTUREFLOW_` env vars.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a recording for the given task, until the stop sequence or Ctrl+C.
    Record {
        /// Short description of the task being recorded, stored with the recording.
        task_description: String,

        /// Directory new recordings are written under. Defaults to the configured capture root.
        #[arg(long)]
        capture_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,captureflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let storage_config =
        StorageConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Record {
            task_description,
            capture_dir,
        } => run_record(task_description, capture_dir, storage_config).await,
    }
}

async fn run_record(
    task_description: String,
    capture_dir: Option<PathBuf>,
    storage_config: StorageConfig,
) -> Result<()> {
    let capture_root = capture_dir.unwrap_or_else(|| PathBuf::from(&storage_config.capture_root));
    std::fs::create_dir_all(&capture_root)
        .with_context(|| format!("creating capture root {}", capture_root.display()))?;

    let (monitor_width, monitor_height) = primary_monitor_size();

    let request = RecordRequest {
        task_description,
        capture_root,
        config: storage_config.recording,
        monitor_width,
        monitor_height,
    };

    let terminate = Arc::new(AtomicBool::new(false));
    let ctrl_c_terminate = terminate.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, ending recording");
            ctrl_c_terminate.store(true, Ordering::Relaxed);
        }
    });

    info!("recording started — press Ctrl+C or the in-session stop sequence to end");
    let outcome = record(request, terminate).await?;

    match &outcome {
        captureflow_host::RecordingOutcome::Clean { recording_id, capture_dir } => {
            info!(%recording_id, dir = %capture_dir.display(), "recording finished cleanly");
        }
        captureflow_host::RecordingOutcome::Partial { recording_id, capture_dir, reason } => {
            error!(%recording_id, dir = %capture_dir.display(), reason, "recording finished partially");
        }
        captureflow_host::RecordingOutcome::VideoPartial { recording_id, capture_dir, reason } => {
            error!(%recording_id, dir = %capture_dir.display(), reason, "recording finished but video.mp4 may be incomplete");
        }
    }

    Ok(())
}

fn primary_monitor_size() -> (i64, i64) {
    match xcap::Monitor::all() {
        Ok(monitors) => monitors
            .into_iter()
            .find(|m| m.is_primary())
            .map(|m| (m.width() as i64, m.height() as i64))
            .unwrap_or((1920, 1080)),
        Err(_) => (1920, 1080),
    }
}
