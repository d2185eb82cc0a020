//! Weather Prediction Engine - Daemon
//!
//! Runs the forecasting engine's background scheduler. The data collector
//! and API layer attach through the engine facade; this binary wires an
//! in-memory history store for standalone operation.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_prediction_engine::external::MemoryHistory;
use weather_prediction_engine::{Config, ForecastEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wps_engine=debug,weather_prediction_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Weather Prediction Engine");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!(
        update_interval_minutes = config.engine.update_interval_minutes,
        retrain_interval_hours = config.engine.retrain_interval_hours,
        "Scheduler cadences"
    );

    let history = Arc::new(MemoryHistory::new());
    let engine = ForecastEngine::new(config, history);

    let handle = engine.start_scheduler();
    tracing::info!("Scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown();

    Ok(())
}
