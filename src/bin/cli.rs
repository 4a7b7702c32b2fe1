//! pagewatch CLI
//!
//! Local execution entry point. Scheduling is left to cron or any other
//! trigger that invokes `pagewatch run`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pagewatch::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, BlockDetector, Normalizer, RunCoordinator, RunReport},
    services::{HttpFetcher, LogTransport},
    storage::{ChangeLog, LocalStorage, SnapshotStore},
};

/// pagewatch - web page change monitor
#[derive(Parser, Debug)]
#[command(
    name = "pagewatch",
    version,
    about = "Detects and archives changes on monitored web pages"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the logs
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check every target once and alert on changes
    Run,

    /// Validate configuration and patterns
    Validate,

    /// Show storage location and latest snapshot per target
    Info,

    /// Re-render the alert report of a past run
    Report {
        /// Run time (RFC 3339); defaults to the most recent run
        #[arg(long)]
        run_time: Option<DateTime<Utc>>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    log::info!("Loaded configuration from {}", config_path.display());

    let storage = Arc::new(LocalStorage::new(&cli.storage_dir));

    match cli.command {
        Command::Run => {
            config.validate()?;

            let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
            let coordinator =
                RunCoordinator::new(&config, fetcher, storage.clone(), storage.clone())?;
            let outcome = coordinator.run(&config.targets).await?;

            if outcome.persist_failures > 0 {
                log::error!("{} log writes failed during the run", outcome.persist_failures);
            }

            let report = RunReport::collect(storage.as_ref(), outcome.run_time, &config.alerts).await?;
            pipeline::deliver(&report, &LogTransport).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let normalizer = Normalizer::new(&config.normalize)?;
            let blocker = BlockDetector::new(&config.blocking)?;

            log::info!(
                "Config OK: {} targets, {} noise patterns, {} block signals",
                config.targets.len(),
                normalizer.pattern_count(),
                blocker.signal_count()
            );
        }

        Command::Info => {
            log::info!("Storage directory: {}", storage.root().display());

            if config.targets.is_empty() {
                log::info!("No targets configured.");
            }
            for target in &config.targets {
                match storage.latest(&target.name).await? {
                    Some(snapshot) => log::info!(
                        "{}: last snapshot {}",
                        target.name,
                        snapshot.run_time.to_rfc3339()
                    ),
                    None => log::info!("{}: no snapshot yet", target.name),
                }
            }

            match storage.latest_run_time().await? {
                Some(run_time) => log::info!("Last run: {}", run_time.to_rfc3339()),
                None => log::info!("No run recorded yet."),
            }
        }

        Command::Report { run_time } => {
            let run_time = match run_time {
                Some(run_time) => run_time,
                None => storage
                    .latest_run_time()
                    .await?
                    .ok_or_else(|| AppError::validation("no run recorded yet"))?,
            };

            let report = RunReport::collect(storage.as_ref(), run_time, &config.alerts).await?;
            if report.records.is_empty() {
                return Err(AppError::validation(format!(
                    "no records for run {}",
                    run_time.to_rfc3339()
                )));
            }

            println!("{}", report.render_subject());
            println!();
            println!("{}", report.render_text());
        }
    }

    Ok(())
}
