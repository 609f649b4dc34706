use chrono::TimeDelta;
use clap::{Parser, Subcommand};
use conflict_detection::ConflictDetectionError;
use conflict_detection::admin;
use conflict_detection::clock::SystemClock;
use conflict_detection::config::Config as ConflictDetectionConfig;
use conflict_detection::merger::ConflictReportMerger;
use conflict_detection::window::format_timestamp;
use options_store::StoreError;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

mod config;
mod telemetry;

use config::{Config, ConfigError};
use telemetry::TelemetryError;

#[derive(Parser)]
#[command(version, about = "Font Awesome conflict detection")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "fontawesome.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the conflict report endpoint
    ConflictDetection,
    /// Accept conflict reports for the next few minutes
    OpenWindow {
        #[arg(
            long,
            default_value_t = 10,
            value_parser = clap::value_parser!(u32)
                .range(1..=i64::from(admin::MAX_DETECTION_WINDOW_MINUTES))
        )]
        minutes: u32,
    },
    /// Stop accepting conflict reports
    CloseWindow,
    /// Print the unregistered clients reported so far
    ShowReport,
    /// Forget all reported unregistered clients
    ClearReport,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("missing `conflict_detection` section in config")]
    MissingConflictDetectionConfig,
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    ConflictDetection(#[from] ConflictDetectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not encode report: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let _telemetry = telemetry::init(&config.common)?;

    let conflict_detection = config
        .conflict_detection
        .ok_or(CliError::MissingConflictDetectionConfig)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(execute(cli.command, conflict_detection))
}

async fn execute(command: CliCommand, config: ConflictDetectionConfig) -> Result<(), CliError> {
    match command {
        CliCommand::ConflictDetection => {
            tracing::info!("Starting conflict detection");
            conflict_detection::run(config).await?;
        }
        CliCommand::OpenWindow { minutes } => {
            let store = options_store::from_config(&config.options_store)?;
            let expires_at = admin::open_detection_window(
                store.as_ref(),
                &SystemClock,
                TimeDelta::minutes(minutes.into()),
            )
            .await?;
            println!("detecting conflicts until {}", format_timestamp(expires_at));
        }
        CliCommand::CloseWindow => {
            let store = options_store::from_config(&config.options_store)?;
            admin::close_detection_window(store.as_ref()).await?;
            println!("stopped detecting conflicts");
        }
        CliCommand::ShowReport => {
            let store = options_store::from_config(&config.options_store)?;
            let merger = ConflictReportMerger::new(store, Arc::new(SystemClock));
            let clients = merger.unregistered_clients().await?;
            println!("{}", serde_json::to_string_pretty(&clients)?);
        }
        CliCommand::ClearReport => {
            let store = options_store::from_config(&config.options_store)?;
            admin::clear_unregistered_clients(store.as_ref()).await?;
            println!("cleared unregistered clients");
        }
    }

    Ok(())
}
