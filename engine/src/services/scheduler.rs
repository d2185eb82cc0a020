//! Background prediction scheduling
//!
//! Drives two independent cadences: periodic forecast regeneration for
//! actively queried locations, and a slower model retraining cycle, plus a
//! daily reconcile pass that feeds the accuracy tracker. The cadences run as
//! separate tasks and never block each other; progress is reported to the
//! host over an event channel.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use shared::{AccuracyAlert, Forecast, Location, RegionKey};

use crate::config::EngineConfig;
use crate::external::HistoricalStore;
use crate::services::accuracy::AccuracyTracker;
use crate::services::predictor::{ForecastService, RetrainOutcome};

/// Cadence of the reconcile/prune/alert pass
const RECONCILE_INTERVAL_HOURS: u64 = 24;

/// Trailing window the degradation check looks at
const ALERT_WINDOW_DAYS: u32 = 7;

/// Messages sent from the background scheduler to the host
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A forecast refresh cycle is starting
    RefreshStarted,
    /// Forecasts regenerated for a location
    ForecastsRefreshed { location: Location, count: usize },
    /// Refresh failed for a location
    ForecastRefreshFailed { location: Location, error: String },
    /// The refresh cycle finished
    RefreshCompleted,
    /// A new model snapshot was published
    RetrainCompleted { region: RegionKey, version: u64 },
    /// Retraining was skipped (already running, or nothing to train on)
    RetrainSkipped { region: RegionKey, reason: String },
    /// Retraining failed; the previous snapshot stays active
    RetrainFailed { region: RegionKey, error: String },
    /// Matured forecasts were reconciled against actual observations
    OutcomesReconciled { count: usize },
    /// Trailing accuracy fell below the configured floor
    AccuracyAlertRaised(AccuracyAlert),
}

/// Handle for the background scheduler
pub struct SchedulerHandle {
    /// Channel delivering scheduler events
    pub receiver: mpsc::Receiver<SchedulerEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SchedulerHandle {
    /// Checks for a pending event without blocking
    pub fn try_recv(&mut self) -> Option<SchedulerEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stops all scheduler tasks
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Spawns the scheduler's background tasks
pub struct PredictionScheduler;

impl PredictionScheduler {
    pub fn spawn(
        service: Arc<ForecastService>,
        tracker: Arc<AccuracyTracker>,
        history: Arc<dyn HistoricalStore>,
        config: EngineConfig,
    ) -> SchedulerHandle {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);

        // Forecasts issued by refresh cycles, awaiting their actuals
        let outstanding: Arc<Mutex<Vec<Forecast>>> = Arc::new(Mutex::new(Vec::new()));

        Self::spawn_refresh_loop(
            service.clone(),
            outstanding.clone(),
            event_tx.clone(),
            shutdown_tx.subscribe(),
            Duration::from_secs(config.update_interval_minutes * 60),
        );
        Self::spawn_maintenance_loop(
            service,
            tracker,
            history,
            outstanding,
            event_tx,
            shutdown_tx.subscribe(),
            Duration::from_secs(config.retrain_interval_hours * 3600),
        );

        SchedulerHandle {
            receiver: event_rx,
            shutdown_tx,
        }
    }

    /// Hourly cadence: regenerate forecasts for every active location
    fn spawn_refresh_loop(
        service: Arc<ForecastService>,
        outstanding: Arc<Mutex<Vec<Forecast>>>,
        tx: mpsc::Sender<SchedulerEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
        period: Duration,
    ) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the immediate first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = tx.send(SchedulerEvent::RefreshStarted).await;

                        for location in service.active_locations() {
                            match service.predict_default(&location).await {
                                Ok(forecasts) => {
                                    let count = forecasts.len();
                                    outstanding
                                        .lock()
                                        .expect("outstanding forecasts lock poisoned")
                                        .extend(forecasts);
                                    let _ = tx
                                        .send(SchedulerEvent::ForecastsRefreshed { location, count })
                                        .await;
                                }
                                Err(e) => {
                                    tracing::warn!(location = %location, error = %e, "scheduled forecast refresh failed");
                                    let _ = tx
                                        .send(SchedulerEvent::ForecastRefreshFailed {
                                            location,
                                            error: e.to_string(),
                                        })
                                        .await;
                                }
                            }
                        }

                        let _ = tx.send(SchedulerEvent::RefreshCompleted).await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Slow cadence: scheduled retraining, daily reconciliation, retention
    /// pruning and the accuracy degradation check
    fn spawn_maintenance_loop(
        service: Arc<ForecastService>,
        tracker: Arc<AccuracyTracker>,
        history: Arc<dyn HistoricalStore>,
        outstanding: Arc<Mutex<Vec<Forecast>>>,
        tx: mpsc::Sender<SchedulerEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
        retrain_period: Duration,
    ) {
        tokio::spawn(async move {
            let mut retrain_interval = tokio::time::interval(retrain_period);
            let mut reconcile_interval =
                tokio::time::interval(Duration::from_secs(RECONCILE_INTERVAL_HOURS * 3600));
            retrain_interval.tick().await;
            reconcile_interval.tick().await;

            loop {
                tokio::select! {
                    _ = retrain_interval.tick() => {
                        Self::retrain_active_regions(&service, &tx).await;
                    }
                    _ = reconcile_interval.tick() => {
                        let reconciled =
                            Self::reconcile_outcomes(&tracker, &history, &outstanding).await;
                        let _ = tx
                            .send(SchedulerEvent::OutcomesReconciled { count: reconciled })
                            .await;

                        tracker.prune();

                        if let Some(alert) = tracker.check_alert_threshold(ALERT_WINDOW_DAYS) {
                            let _ = tx
                                .send(SchedulerEvent::AccuracyAlertRaised(alert))
                                .await;
                            // Degraded accuracy triggers an off-schedule retrain
                            Self::retrain_active_regions(&service, &tx).await;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    async fn retrain_active_regions(
        service: &Arc<ForecastService>,
        tx: &mpsc::Sender<SchedulerEvent>,
    ) {
        let mut regions: Vec<RegionKey> = service
            .active_locations()
            .iter()
            .map(Location::region)
            .collect();
        regions.sort_by_key(|r| (r.lat_cell, r.lon_cell));
        regions.dedup();

        for region in regions {
            // Detached so a long fit never blocks this loop's other arms
            let service = service.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let event = match service.trigger_retrain(region).await {
                    Ok(RetrainOutcome::Completed(version)) => {
                        SchedulerEvent::RetrainCompleted { region, version }
                    }
                    Ok(RetrainOutcome::AlreadyInProgress) => SchedulerEvent::RetrainSkipped {
                        region,
                        reason: "already in progress".to_string(),
                    },
                    Ok(RetrainOutcome::NoActiveLocation) => SchedulerEvent::RetrainSkipped {
                        region,
                        reason: "no active location".to_string(),
                    },
                    Err(e) => {
                        tracing::error!(%region, error = %e, "scheduled retraining failed, keeping previous snapshot");
                        SchedulerEvent::RetrainFailed {
                            region,
                            error: e.to_string(),
                        }
                    }
                };
                let _ = tx.send(event).await;
            });
        }
    }

    /// Match matured forecasts with their actual observations
    async fn reconcile_outcomes(
        tracker: &Arc<AccuracyTracker>,
        history: &Arc<dyn HistoricalStore>,
        outstanding: &Arc<Mutex<Vec<Forecast>>>,
    ) -> usize {
        let today = Utc::now().date_naive();
        let matured: Vec<Forecast> = {
            let queue = outstanding
                .lock()
                .expect("outstanding forecasts lock poisoned");
            queue
                .iter()
                .filter(|f| f.forecast_date < today)
                .cloned()
                .collect()
        };

        let mut reconciled = 0;
        let mut resolved: Vec<(String, chrono::NaiveDate)> = Vec::new();
        let mut touched_dates: Vec<chrono::NaiveDate> = Vec::new();

        for forecast in matured {
            match history.get_actual(&forecast.location, forecast.forecast_date).await {
                Ok(Some(actual)) => {
                    if let Err(e) = tracker.record_outcome(&forecast, &actual) {
                        tracing::warn!(error = %e, "failed to record forecast outcome");
                    } else {
                        reconciled += 1;
                        touched_dates.push(forecast.forecast_date);
                    }
                    resolved.push((forecast.location.cache_key(), forecast.forecast_date));
                }
                Ok(None) => {
                    // Actual not delivered yet; retry on the next pass
                }
                Err(e) => {
                    tracing::warn!(
                        location = %forecast.location,
                        date = %forecast.forecast_date,
                        error = %e,
                        "history store unavailable, skipping accuracy update for this day"
                    );
                }
            }
        }

        {
            let mut queue = outstanding
                .lock()
                .expect("outstanding forecasts lock poisoned");
            queue.retain(|f| {
                !resolved
                    .iter()
                    .any(|(key, date)| *key == f.location.cache_key() && *date == f.forecast_date)
            });
        }

        // Roll the day's outcomes into the retained metric ledger
        touched_dates.sort();
        touched_dates.dedup();
        for date in touched_dates {
            tracker.daily_metrics(date);
        }

        reconciled
    }
}
