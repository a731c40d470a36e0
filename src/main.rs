// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use crate::application::execution_guard::ExecutionGuard;
use crate::application::forecast_service::ForecastOrchestrator;
use crate::application::forecast_store::ForecastStore;
use crate::application::model_runner::ForecastPipelineRunner;
use crate::application::prediction_service::PredictionService;
use crate::application::reef_data_service::ReefDataService;
use crate::application::result_cache::CacheControl;
use crate::application::scheduler::Scheduler;
use crate::application::sst_source::SstSource;
use crate::infrastructure::config::{load_settings, LogSettings};
use crate::infrastructure::csv_store::CsvForecastStore;
use crate::infrastructure::erddap_repository::ErddapRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;
use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if log.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings().context("Failed to load configuration")?;
    init_tracing(&settings.log);

    let locations = settings.reef_locations();

    // Infrastructure
    let repository = Arc::new(ErddapRepository::new(&settings.erddap)?);
    tokio::fs::create_dir_all(&settings.data.dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", settings.data.dir.display()))?;
    let store: Arc<dyn ForecastStore> = Arc::new(CsvForecastStore::new(&settings.data.dir));

    // Forecasting
    let orchestrator = Arc::new(ForecastOrchestrator::new(
        SstSource::new(repository),
        settings.forecast.clone(),
    ));
    let prediction_service = Arc::new(PredictionService::new(
        orchestrator.clone(),
        locations.clone(),
        settings.cache.ttl(),
    ));
    let reef_data_service = Arc::new(ReefDataService::new(
        store.clone(),
        locations.clone(),
        settings.forecast.bleaching_threshold,
    ));

    // Guarded execution and scheduling
    let runner = Arc::new(ForecastPipelineRunner::new(
        orchestrator,
        store,
        locations.clone(),
        Duration::from_secs(settings.execution.output_max_age_secs),
    ));
    let caches: Vec<Arc<dyn CacheControl>> = vec![prediction_service.clone()];
    let guard = Arc::new(ExecutionGuard::from_settings(runner, &settings.execution, caches));
    let scheduler = Arc::new(Scheduler::new(guard.clone(), &settings.scheduler)?);
    if settings.scheduler.enabled {
        scheduler.start();
    }

    let state = Arc::new(AppState {
        prediction_service,
        reef_data_service,
        guard,
        scheduler: scheduler.clone(),
    });
    let router = build_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!(%addr, locations = locations.len(), "Starting reefwatch service");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    Ok(())
}
