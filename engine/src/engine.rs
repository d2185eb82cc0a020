//! Engine facade consumed by the API layer
//!
//! Wires the services together and exposes the operations the surrounding
//! system calls: predict, warnings, accuracy metrics, administrative
//! retraining and the collector callbacks.

use std::sync::Arc;

use shared::{AccuracyMetric, Forecast, Location, Observation, RegionKey, WeatherWarning};

use crate::config::Config;
use crate::error::AppResult;
use crate::external::HistoricalStore;
use crate::services::accuracy::AccuracyTracker;
use crate::services::predictor::{ForecastService, RetrainOutcome};
use crate::services::scheduler::{PredictionScheduler, SchedulerHandle};
use crate::services::warnings::WarningGenerator;

/// The forecasting-and-accuracy engine
pub struct ForecastEngine {
    config: Arc<Config>,
    history: Arc<dyn HistoricalStore>,
    forecasts: Arc<ForecastService>,
    tracker: Arc<AccuracyTracker>,
    warnings: WarningGenerator,
}

impl ForecastEngine {
    pub fn new(config: Config, history: Arc<dyn HistoricalStore>) -> Self {
        let tracker = Arc::new(AccuracyTracker::new(
            config.engine.retention_days,
            config.engine.accuracy_alert_floor,
            config.engine.min_predictions_for_alert,
        ));
        let forecasts = Arc::new(ForecastService::new(
            history.clone(),
            tracker.clone(),
            config.engine.clone(),
        ));
        let warnings = WarningGenerator::new(config.thresholds.clone());

        Self {
            config: Arc::new(config),
            history,
            forecasts,
            tracker,
            warnings,
        }
    }

    /// Multi-day forecast for a location, `days` in [1, 14]
    pub async fn predict(&self, location: &Location, days: u32) -> AppResult<Vec<Forecast>> {
        self.forecasts.predict(location, days).await
    }

    /// Forecast with the configured default horizon
    pub async fn predict_default(&self, location: &Location) -> AppResult<Vec<Forecast>> {
        self.forecasts.predict_default(location).await
    }

    /// Active safety warnings derived from the location's current forecast
    pub async fn get_warnings(&self, location: &Location) -> AppResult<Vec<WeatherWarning>> {
        let forecasts = self.forecasts.predict_default(location).await?;
        Ok(self.warnings.analyze_forecasts(&forecasts))
    }

    /// Retained daily accuracy metrics for the trailing window
    pub fn get_accuracy_metrics(&self, days: u32) -> Vec<AccuracyMetric> {
        self.tracker.metrics(days)
    }

    /// Metrics over the full retention window
    pub fn get_accuracy_metrics_default(&self) -> Vec<AccuracyMetric> {
        self.tracker.metrics(self.config.engine.retention_days)
    }

    /// Aggregate (and retain) the daily metric for one target date
    pub fn daily_metrics(&self, date: chrono::NaiveDate) -> AccuracyMetric {
        self.tracker.daily_metrics(date)
    }

    /// Administrative retraining for a region; idempotent while running
    pub async fn trigger_retrain(&self, region: RegionKey) -> AppResult<RetrainOutcome> {
        self.forecasts.trigger_retrain(region).await
    }

    /// Train a snapshot for the location's region right now
    pub async fn train(&self, location: &Location) -> AppResult<RetrainOutcome> {
        self.forecasts.train(location).await
    }

    /// Collector callback: record the outcome of a matured forecast
    pub fn record_outcome(&self, forecast: &Forecast, actual: &Observation) -> AppResult<()> {
        self.tracker.record_outcome(forecast, actual)
    }

    /// Collector callback: buffer new observations for the next training run
    pub fn update(&self, observations: Vec<Observation>) {
        self.forecasts.update(observations);
    }

    /// Start the background refresh/retrain scheduler
    pub fn start_scheduler(&self) -> SchedulerHandle {
        PredictionScheduler::spawn(
            self.forecasts.clone(),
            self.tracker.clone(),
            self.history.clone(),
            self.config.engine.clone(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Version of the active model snapshot for a region, if any
    pub fn model_version(&self, region: RegionKey) -> Option<u64> {
        self.forecasts.model_version(region)
    }
}
