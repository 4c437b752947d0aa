//! Scout worker entry point.
//!
//! Polls an OPDS catalog for items newer than the persisted watermark and
//! pushes them into the Sage ingest endpoint. Runs once by default; with
//! `--interval` it keeps polling on a fixed cadence.

mod config;
mod destination;
mod source;
mod state;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::ScoutConfig;
use destination::ApiDestination;
use source::OpdsSource;
use state::ScoutState;
use worker::WorkerService;

/// Upper bound on one batch run.
const RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Parser)]
#[command(name = "sage-scout", about = "Batch catalog scout for the Sage ingest API")]
struct Args {
    /// Poll repeatedly with this many seconds between runs.
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = ScoutConfig::from_env()?;

    let source = Arc::new(
        OpdsSource::new(&config.opds_base_url, config.max_book_size_bytes).with_basic_auth(
            config.opds_username.clone(),
            config.opds_password.clone(),
        ),
    );
    let destination = Arc::new(ApiDestination::new(&config.api_base_url));

    loop {
        // State is reloaded per run so an operator can reset the file
        // between polls.
        let state = Arc::new(ScoutState::load(&config.state_file)?);
        let service = WorkerService::new(
            config.clone(),
            Arc::clone(&source) as _,
            Arc::clone(&destination) as _,
            state,
        );

        match tokio::time::timeout(RUN_TIMEOUT, service.run()).await {
            Ok(Ok(report)) => {
                info!(
                    fetched = report.fetched,
                    submitted = report.submitted,
                    failed = report.failed,
                    skipped = report.skipped,
                    "run finished"
                );
            }
            Ok(Err(err)) => error!(error = %err, "run failed"),
            Err(_) => error!("run timed out"),
        }

        match args.interval {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => break,
        }
    }

    Ok(())
}
