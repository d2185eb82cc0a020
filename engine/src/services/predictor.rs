//! Forecast generation and model lifecycle
//!
//! Serving reads the currently published model snapshot and never waits on
//! training: retraining happens on a blocking worker and publishes a new
//! snapshot atomically when it completes (stale-while-revalidate). Predict
//! calls for the same location are single-flighted through a per-key lock so
//! concurrent callers reuse one computation.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use shared::{validate_location, Forecast, Location, Observation, RegionKey};

use crate::config::EngineConfig;
use crate::error::{AppError, AppResult};
use crate::external::HistoricalStore;
use crate::services::accuracy::AccuracyTracker;
use crate::services::confidence::ConfidenceEstimator;
use crate::services::features::FeatureExtractor;
use crate::services::model::{
    fallback_condition, train_model, Climatology, ModelState, TrainingOptions,
};

pub const MIN_FORECAST_DAYS: u32 = 1;
pub const MAX_FORECAST_DAYS: u32 = 14;

/// Days of history fed into a training run
const TRAINING_WINDOW_DAYS: i64 = 365;
/// Days of history fed into feature extraction at predict time
const FEATURE_WINDOW_DAYS: i64 = 8;
/// Trailing window of recorded outcomes that discounts confidence
const ACCURACY_WINDOW_DAYS: u32 = 7;
/// Horizon (days) at which model output has fully blended into climatology
const CLIMATOLOGY_BLEND_DAYS: f64 = 10.0;
/// Millimetres of daily precipitation treated as a certain-rain signal
const PRECIPITATION_SATURATION_MM: f64 = 10.0;

/// Result of an administrative retrain request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrainOutcome {
    /// A new snapshot with this version was published
    Completed(u64),
    /// A training run for the region was already underway
    AlreadyInProgress,
    /// No location in the region has been queried yet, nothing to train on
    NoActiveLocation,
}

struct CachedBatch {
    forecasts: Vec<Forecast>,
    days: u32,
    region: RegionKey,
    generated_at: DateTime<Utc>,
}

/// Generates forecasts and owns the model snapshot lifecycle
pub struct ForecastService {
    history: Arc<dyn HistoricalStore>,
    tracker: Arc<AccuracyTracker>,
    extractor: FeatureExtractor,
    confidence: ConfidenceEstimator,
    config: EngineConfig,
    /// Active snapshot per region; readers clone the Arc at call start
    states: RwLock<HashMap<RegionKey, Arc<ModelState>>>,
    /// Observations buffered by `update` until the next training run
    pending: Mutex<Vec<Observation>>,
    /// Served batches, keyed by location + horizon
    cache: AsyncMutex<HashMap<String, CachedBatch>>,
    /// Per-key locks enforcing at-most-one concurrent computation
    flights: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Regions with a training run underway
    training: Mutex<HashSet<RegionKey>>,
    /// Locations that have been queried, for the scheduler's refresh loop
    active: Mutex<HashMap<String, Location>>,
}

impl ForecastService {
    pub fn new(
        history: Arc<dyn HistoricalStore>,
        tracker: Arc<AccuracyTracker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            history,
            tracker,
            extractor: FeatureExtractor::new(
                config.min_window_observations,
                config.stale_after_hours,
            ),
            confidence: ConfidenceEstimator::new(config.low_confidence_threshold),
            config,
            states: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            cache: AsyncMutex::new(HashMap::new()),
            flights: AsyncMutex::new(HashMap::new()),
            training: Mutex::new(HashSet::new()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Generate `days` daily forecasts for a location
    ///
    /// Exactly `days` records, dates ascending one day at a time starting
    /// tomorrow. Concurrent calls for the same (location, days) reuse the
    /// in-flight computation; fresh batches are served from cache until the
    /// configured TTL lapses.
    pub async fn predict(&self, location: &Location, days: u32) -> AppResult<Vec<Forecast>> {
        validate_location(location).map_err(|e| AppError::InvalidLocation(e.to_string()))?;
        if !(MIN_FORECAST_DAYS..=MAX_FORECAST_DAYS).contains(&days) {
            return Err(AppError::InvalidRequest(format!(
                "forecast horizon must be between {MIN_FORECAST_DAYS} and {MAX_FORECAST_DAYS} days, got {days}"
            )));
        }

        self.mark_active(location);

        let key = format!("{}|{}", location.cache_key(), days);
        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        // Holders queue here; the first computes, the rest hit the cache
        let _guard = flight.lock().await;

        let ttl = Duration::minutes(self.config.forecast_cache_minutes);
        {
            let cache = self.cache.lock().await;
            if let Some(batch) = cache.get(&key) {
                if batch.days == days && Utc::now() - batch.generated_at < ttl {
                    return Ok(batch.forecasts.clone());
                }
            }
        }

        let forecasts = self.compute_forecasts(location, days).await?;

        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CachedBatch {
                forecasts: forecasts.clone(),
                days,
                region: location.region(),
                generated_at: Utc::now(),
            },
        );

        Ok(forecasts)
    }

    async fn compute_forecasts(&self, location: &Location, days: u32) -> AppResult<Vec<Forecast>> {
        let now = Utc::now();
        let observations = match self
            .history
            .get_observations(location, now - Duration::days(FEATURE_WINDOW_DAYS), now)
            .await
        {
            Ok(observations) => observations,
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "history store unavailable, proceeding without window");
                Vec::new()
            }
        };

        let state = {
            let states = self.states.read().expect("state registry lock poisoned");
            states.get(&location.region()).cloned()
        };

        match state {
            Some(state) => match self.extractor.extract(location, now, &observations) {
                Ok(extracted) => {
                    if extracted.stale {
                        tracing::warn!(location = %location, "observation window is stale, discounting confidence");
                    }
                    Ok(self.model_forecasts(location, days, now, &state, &extracted))
                }
                Err(AppError::InsufficientData { required, available }) => {
                    tracing::warn!(
                        location = %location,
                        required,
                        available,
                        "window too thin for features, serving climatology baseline"
                    );
                    Ok(self.baseline_forecasts(location, days, now, &state.climatology))
                }
                Err(other) => Err(other),
            },
            None => {
                tracing::warn!(location = %location, "no trained model for region, serving climatology baseline");
                let climatology = Climatology::fit(&observations);
                Ok(self.baseline_forecasts(location, days, now, &climatology))
            }
        }
    }

    /// Model-backed batch: ensemble output blended toward climatology as the
    /// horizon grows
    fn model_forecasts(
        &self,
        location: &Location,
        days: u32,
        now: DateTime<Utc>,
        state: &ModelState,
        extracted: &crate::services::features::ExtractedFeatures,
    ) -> Vec<Forecast> {
        let normalized = state.normalization.apply(&extracted.vector);
        let (high_raw, _) = state.temp_high.predict_with_spread(&normalized);
        let (low_raw, _) = state.temp_low.predict_with_spread(&normalized);
        let (precip_raw, _) = state.precipitation.predict_with_spread(&normalized);
        let precip_raw = precip_raw.max(0.0);
        // Feature index 6 is the raw 24h wind mean in m/s
        let wind_raw_kmh = extracted.vector.values.get(6).copied().unwrap_or(0.0) * 3.6;

        let recent_accuracy = self
            .tracker
            .recent_accuracy(location, ACCURACY_WINDOW_DAYS);

        (0..days)
            .map(|day_offset| {
                let forecast_date = (now + Duration::days(i64::from(day_offset) + 1)).date_naive();
                let month = state.climatology.month(forecast_date.month());

                let weight = (f64::from(day_offset) / CLIMATOLOGY_BLEND_DAYS).min(1.0);
                let blend = |model: f64, clim: f64| model * (1.0 - weight) + clim * weight;

                let mut high = blend(high_raw, month.temp_high_mean);
                let mut low = blend(low_raw, month.temp_low_mean);
                if low > high {
                    std::mem::swap(&mut high, &mut low);
                }

                let precipitation_mm = blend(precip_raw, month.precipitation_mean).max(0.0);
                let probability = blend(
                    (precip_raw / PRECIPITATION_SATURATION_MM).clamp(0.0, 1.0),
                    month.rain_probability,
                )
                .clamp(0.0, 1.0);
                let wind_kmh = blend(wind_raw_kmh, month.wind_kmh_mean).max(0.0);

                let condition = state
                    .conditions
                    .predict(high, precipitation_mm)
                    .unwrap_or_else(|| fallback_condition(high, precipitation_mm));

                let confidence = self.confidence.calculate(
                    day_offset as usize,
                    state,
                    recent_accuracy,
                    extracted.stale,
                );

                Forecast {
                    location: location.clone(),
                    forecast_date,
                    predicted_temperature_high: high,
                    predicted_temperature_low: low,
                    precipitation_probability: probability,
                    predicted_precipitation_mm: precipitation_mm,
                    predicted_wind_speed_kmh: wind_kmh,
                    weather_condition: condition,
                    confidence_score: confidence,
                    low_confidence: self.confidence.is_low(confidence),
                    generated_at: now,
                }
            })
            .collect()
    }

    /// Seasonal-average batch served when no model applies; confidence is
    /// capped below 0.5 and always flagged low
    fn baseline_forecasts(
        &self,
        location: &Location,
        days: u32,
        now: DateTime<Utc>,
        climatology: &Climatology,
    ) -> Vec<Forecast> {
        (0..days)
            .map(|day_offset| {
                let forecast_date = (now + Duration::days(i64::from(day_offset) + 1)).date_naive();
                let month = climatology.month(forecast_date.month());
                let confidence = self.confidence.baseline(day_offset as usize);

                Forecast {
                    location: location.clone(),
                    forecast_date,
                    predicted_temperature_high: month.temp_high_mean,
                    predicted_temperature_low: month.temp_low_mean.min(month.temp_high_mean),
                    precipitation_probability: month.rain_probability.clamp(0.0, 1.0),
                    predicted_precipitation_mm: month.precipitation_mean.max(0.0),
                    predicted_wind_speed_kmh: month.wind_kmh_mean.max(0.0),
                    weather_condition: fallback_condition(
                        month.temp_high_mean,
                        month.precipitation_mean,
                    ),
                    confidence_score: confidence,
                    low_confidence: self.confidence.is_low(confidence),
                    generated_at: now,
                }
            })
            .collect()
    }

    /// Train a new snapshot for the location's region and publish it
    ///
    /// Idempotent while a run is underway: a second call observes the
    /// in-progress marker and returns without training. The fit itself runs
    /// on a blocking worker; the previous snapshot keeps serving until the
    /// new one is published.
    pub async fn train(&self, location: &Location) -> AppResult<RetrainOutcome> {
        let region = location.region();
        {
            let mut training = self.training.lock().expect("training set lock poisoned");
            if !training.insert(region) {
                tracing::info!(%region, "retrain requested while already in progress");
                return Ok(RetrainOutcome::AlreadyInProgress);
            }
        }

        let result = self.train_inner(location, region).await;

        self.training
            .lock()
            .expect("training set lock poisoned")
            .remove(&region);

        result
    }

    async fn train_inner(&self, location: &Location, region: RegionKey) -> AppResult<RetrainOutcome> {
        let now = Utc::now();
        let mut observations = self
            .history
            .get_observations(location, now - Duration::days(TRAINING_WINDOW_DAYS), now)
            .await?;

        // Fold in buffered update() deliveries for this region
        let buffered: Vec<Observation> = {
            let pending = self.pending.lock().expect("pending buffer lock poisoned");
            pending
                .iter()
                .filter(|o| o.location.region() == region)
                .cloned()
                .collect()
        };
        observations.extend(buffered);
        // Fixed input ordering keeps training deterministic
        observations.sort_by_key(|o| o.timestamp);
        observations.dedup_by_key(|o| (o.location.cache_key(), o.timestamp));

        let next_version = {
            let states = self.states.read().expect("state registry lock poisoned");
            states.get(&region).map(|s| s.version + 1).unwrap_or(1)
        };

        let extractor = self.extractor.clone();
        let options = TrainingOptions {
            seed: self.config.model_seed,
            ..TrainingOptions::default()
        };

        let state = tokio::task::spawn_blocking(move || {
            train_model(&observations, &extractor, next_version, &options)
        })
        .await
        .map_err(|e| AppError::ModelTraining(format!("training task panicked: {e}")))??;

        // Publish atomically; in-flight predictions keep their old Arc
        {
            let mut states = self.states.write().expect("state registry lock poisoned");
            states.insert(region, Arc::new(state));
        }

        // Consume the buffered observations that went into this fit
        {
            let mut pending = self.pending.lock().expect("pending buffer lock poisoned");
            pending.retain(|o| o.location.region() != region);
        }

        // Drop cached batches produced by the superseded snapshot
        {
            let mut cache = self.cache.lock().await;
            cache.retain(|_, batch| batch.region != region);
        }

        tracing::info!(%region, version = next_version, "published new model snapshot");
        Ok(RetrainOutcome::Completed(next_version))
    }

    /// Administrative retrain for a region; idempotent while one is running
    pub async fn trigger_retrain(&self, region: RegionKey) -> AppResult<RetrainOutcome> {
        let Some(location) = self.active_location_in(region) else {
            tracing::warn!(%region, "retrain requested for region with no active locations");
            return Ok(RetrainOutcome::NoActiveLocation);
        };
        self.train(&location).await
    }

    /// Buffer newly arrived observations until the next training run
    pub fn update(&self, new_observations: Vec<Observation>) {
        if new_observations.is_empty() {
            return;
        }
        let mut pending = self.pending.lock().expect("pending buffer lock poisoned");
        tracing::debug!(
            buffered = new_observations.len(),
            total = pending.len() + new_observations.len(),
            "buffered observations for next training run"
        );
        pending.extend(new_observations);
    }

    /// Version of the active snapshot for a region, if any
    pub fn model_version(&self, region: RegionKey) -> Option<u64> {
        let states = self.states.read().expect("state registry lock poisoned");
        states.get(&region).map(|s| s.version)
    }

    /// Locations seen by predict, the scheduler's refresh set
    pub fn active_locations(&self) -> Vec<Location> {
        let active = self.active.lock().expect("active set lock poisoned");
        active.values().cloned().collect()
    }

    fn active_location_in(&self, region: RegionKey) -> Option<Location> {
        let active = self.active.lock().expect("active set lock poisoned");
        active.values().find(|l| l.region() == region).cloned()
    }

    fn mark_active(&self, location: &Location) {
        let mut active = self.active.lock().expect("active set lock poisoned");
        active
            .entry(location.cache_key())
            .or_insert_with(|| location.clone());
    }

    /// Default-horizon convenience used by the facade
    pub async fn predict_default(&self, location: &Location) -> AppResult<Vec<Forecast>> {
        self.predict(location, self.config.default_forecast_days).await
    }
}
