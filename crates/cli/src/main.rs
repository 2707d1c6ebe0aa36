//! Framewatch CLI - supervised ffmpeg frame extraction
//! Composition root: configuration, logging, wiring (ADR-001)

mod ffmpeg;
mod report;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use framewatch_core::application::{
    cancel_channel, AdmissionGate, FrameExtractor, InvocationRequest, ProcessRegistry,
};
use framewatch_core::port::id_provider::UuidProvider;
use framewatch_core::port::time_provider::SystemTimeProvider;
use framewatch_infra_system::{FsOutputProbe, TokioProcessSpawner};

use report::ReportRow;
use settings::Settings;

#[derive(Parser)]
#[command(name = "framewatch")]
#[command(about = "Supervised ffmpeg frame extraction", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "FRAMEWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract still frames from one or more videos
    Extract {
        /// Input video files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory receiving one frame subdirectory per input
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Seconds of video between extracted frames
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        every: u64,

        /// ffmpeg executable
        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        /// Extractions allowed to run at once
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Seconds without new frames before a run counts as stalled
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Print results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config_path = cli.config.as_deref().map(expand_path);
    let mut settings =
        Settings::load(config_path.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }

        Commands::Extract {
            inputs,
            output_dir,
            every,
            ffmpeg,
            max_concurrent,
            poll_interval,
            json,
        } => {
            // Flags override file and environment
            if let Some(path) = ffmpeg {
                settings.ffmpeg_path = path;
            }
            if let Some(n) = max_concurrent {
                settings.max_concurrent = n;
            }
            if let Some(secs) = poll_interval {
                settings.poll_interval_secs = secs;
            }
            settings.validate()?;
            settings.ffmpeg_path = expand_path(&settings.ffmpeg_path);

            let rows = run_extract(&settings, &inputs, &expand_path(&output_dir), every).await?;

            if json {
                report::print_json(&rows)?;
            } else {
                report::print_table(&rows);
            }

            if rows.iter().any(|r| !r.succeeded) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable (ADR-050)
fn init_logging() -> Result<()> {
    let log_format =
        std::env::var("FRAMEWATCH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("framewatch=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

async fn run_extract(
    settings: &Settings,
    inputs: &[PathBuf],
    output_dir: &Path,
    every: u64,
) -> Result<Vec<ReportRow>> {
    // The tool runs inside its frame directory, so every path is made absolute
    let inputs = inputs
        .iter()
        .map(|input| {
            expand_path(input)
                .canonicalize()
                .with_context(|| format!("Input not found: {}", input.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let output_dir = output_dir.canonicalize()?;

    let frame_dirs = ffmpeg::assign_frame_dirs(&output_dir, &inputs);
    for dir in &frame_dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // DI wiring
    let extractor = FrameExtractor::new(
        Arc::new(TokioProcessSpawner::new(settings.env_allowlist.clone())),
        Arc::new(FsOutputProbe),
        Arc::new(AdmissionGate::new(settings.max_concurrent)),
        Arc::new(ProcessRegistry::new()),
        Arc::new(SystemTimeProvider),
        Arc::new(UuidProvider),
    )
    .with_termination_grace(settings.termination_grace());

    let (cancel_tx, cancel) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling extractions");
            cancel_tx.cancel();
        }
    });

    info!(
        inputs = inputs.len(),
        max_concurrent = settings.max_concurrent,
        poll_interval_secs = settings.poll_interval_secs,
        output_dir = %output_dir.display(),
        "Starting extraction"
    );

    let extractor = &extractor;
    let runs = inputs.iter().zip(&frame_dirs).map(|(input, frame_dir)| {
        let command = ffmpeg::extract_command(
            &settings.ffmpeg_path,
            input,
            frame_dir,
            every,
            &settings.frame_extension,
        );
        let request = InvocationRequest::new(command, input.display().to_string())
            .with_output_dir(frame_dir)
            .with_frame_extension(&settings.frame_extension)
            .with_poll_interval(settings.poll_interval())
            .with_cancel(cancel.clone());

        async move {
            let result = extractor.extract_frames(&request).await;
            ReportRow::from_result(&request.target, &result)
        }
    });

    Ok(futures::future::join_all(runs).await)
}
