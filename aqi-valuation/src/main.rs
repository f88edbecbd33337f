//! AQI Valuation - RIM valuation service for A-share listed companies.
//!
//! Serves residual income model proposals and sensitivity grids built from
//! the local accounting data snapshot.

use anyhow::{Context, Result};
use aqi_common::config::Config;
use aqi_common::logging::init_logging_with_exclusions;
use aqi_valuation::data::LocalStorage;
use aqi_valuation::{ValuationService, ValuationState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    let config = Config::load_and_validate()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("AQI Valuation v{}", env!("CARGO_PKG_VERSION"));

    let store = LocalStorage::open(&config.data.db_path)
        .with_context(|| format!("Failed to open data store {}", config.data.db_path.display()))?;
    match store.get_stats().await {
        Ok(stats) => tracing::info!("{}", stats),
        Err(e) => tracing::warn!(error = %e, "Failed to read data store statistics"),
    }

    let state = ValuationState::new(config, Arc::new(store))?;
    let service = ValuationService::new(state);

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
