//! Metrics preload binary.
//!
//! Loads the engine configuration, builds the repository and calculator chain,
//! runs one preload of every saved report and reports progress until it ends.
//!
//! # Usage
//!
//! ```bash
//! # Uses metrics.toml from the current, backend/ or parent directory
//! cargo run --bin metrics-preload
//!
//! # Explicit configuration and fixture
//! METRICS_CONFIG=backend/metrics.toml METRICS_FIXTURE=fixture.json \
//!   cargo run --bin metrics-preload
//! ```
//!
//! # Environment Variables
//!
//! - `METRICS_CONFIG`: Path to the configuration file
//! - `REPOSITORY_TYPE`, `METRICS_FIXTURE`: Used when no configuration file is found
//! - `PRELOAD_POLL_MS`: Status polling interval (default: 500)
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use survey_metrics::api::{
    ConvenientCalculator, DataPreloadTaskCache, DataPreloader, EngineConfig, PreloadState,
    RepositoryFactory, ResultsCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .init();

    info!("Starting metrics preload");

    let config = match env::var("METRICS_CONFIG") {
        Ok(path) => EngineConfig::from_file(&path)?,
        Err(_) => EngineConfig::from_default_location().unwrap_or_else(|e| {
            warn!("{}; using defaults", e);
            EngineConfig::default()
        }),
    };
    let repository = if config.repository.fixture_path.is_some() {
        RepositoryFactory::from_config(&config)?
    } else {
        RepositoryFactory::from_env()?
    };
    info!("Repository initialized successfully");

    let calculator = ConvenientCalculator::from_config(repository, &config, None);
    let preloader = DataPreloader::new(
        calculator,
        DataPreloadTaskCache::from_settings(&config.preload),
        ResultsCache::new(),
        &config.preload,
    );

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let status = preloader.preload_report_data_into_memory(&shutdown).await?;
    info!(
        "Preload {} started for '{}' with {} reports",
        status.task_id,
        preloader.cache_key(),
        status.total_count
    );

    let poll = Duration::from_millis(
        env::var("PRELOAD_POLL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500),
    );
    loop {
        let status = preloader.check_task_status()?;
        info!(
            "Preload progress: {}/{} ({} failed)",
            status.completed_count,
            status.total_count,
            status.errors.len()
        );
        match status.state() {
            PreloadState::Running => {
                if shutdown.is_cancelled() {
                    preloader.cancel_task()?;
                }
            }
            PreloadState::Completed | PreloadState::Cancelled | PreloadState::Idle => {
                for error in &status.errors {
                    warn!("{}", error);
                }
                info!(
                    "Preload finished ({:?}); {} reports cached",
                    status.state(),
                    preloader.results().len()
                );
                break;
            }
        }
        tokio::time::sleep(poll).await;
    }

    Ok(())
}
