//! Configuration management for the Weather Prediction Engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with WPS_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Retention may be tuned upward but never below this floor
pub const MIN_RETENTION_DAYS: u32 = 90;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Engine tuning parameters
    pub engine: EngineConfig,

    /// Warning threshold tables
    pub thresholds: SeverityThresholds,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Forecast regeneration cadence per active location
    pub update_interval_minutes: u64,

    /// Scheduled retraining cadence
    pub retrain_interval_hours: u64,

    /// Forecasts below this confidence are flagged low-confidence
    pub low_confidence_threshold: f64,

    /// Trailing overall accuracy below this floor raises a degradation alert
    pub accuracy_alert_floor: f64,

    /// Minimum recorded outcomes before accuracy alerts fire
    pub min_predictions_for_alert: usize,

    /// How long accuracy records stay retrievable (never below 90)
    pub retention_days: u32,

    /// Minimum observations required to extract features
    pub min_window_observations: usize,

    /// Observation windows older than this are flagged stale
    pub stale_after_hours: i64,

    /// How long a generated forecast batch is served from cache
    pub forecast_cache_minutes: i64,

    /// Days to forecast when the caller does not say
    pub default_forecast_days: u32,

    /// Seed for deterministic ensemble training
    pub model_seed: u64,
}

/// Threshold bands for one warning dimension, ordered low → severe
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SeverityBands {
    pub low: f64,
    pub moderate: f64,
    pub high: f64,
    pub severe: f64,
}

/// Per-warning-type numeric threshold tables
///
/// Externally configurable data: operators tune these without touching the
/// classification logic.
#[derive(Debug, Deserialize, Clone)]
pub struct SeverityThresholds {
    /// Daily high temperature bands in °C
    pub heat_celsius: SeverityBands,
    /// Daily low temperature bands in °C (colder is worse)
    pub cold_celsius: SeverityBands,
    /// Peak wind speed bands in km/h
    pub wind_kmh: SeverityBands,
    /// Precipitation volume bands in mm
    pub precipitation_mm: SeverityBands,
    /// Precipitation probability that must accompany a flood volume band
    pub flood_probability: f64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("WPS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("engine.update_interval_minutes", 60)?
            .set_default("engine.retrain_interval_hours", 168)?
            .set_default("engine.low_confidence_threshold", 0.70)?
            .set_default("engine.accuracy_alert_floor", 0.70)?
            .set_default("engine.min_predictions_for_alert", 10)?
            .set_default("engine.retention_days", 90)?
            .set_default("engine.min_window_observations", 72)?
            .set_default("engine.stale_after_hours", 6)?
            .set_default("engine.forecast_cache_minutes", 30)?
            .set_default("engine.default_forecast_days", 7)?
            .set_default("engine.model_seed", 42)?
            .set_default("thresholds.heat_celsius.low", 30.0)?
            .set_default("thresholds.heat_celsius.moderate", 35.0)?
            .set_default("thresholds.heat_celsius.high", 40.0)?
            .set_default("thresholds.heat_celsius.severe", 45.0)?
            .set_default("thresholds.cold_celsius.low", 0.0)?
            .set_default("thresholds.cold_celsius.moderate", -10.0)?
            .set_default("thresholds.cold_celsius.high", -20.0)?
            .set_default("thresholds.cold_celsius.severe", -30.0)?
            .set_default("thresholds.wind_kmh.low", 36.0)?
            .set_default("thresholds.wind_kmh.moderate", 54.0)?
            .set_default("thresholds.wind_kmh.high", 72.0)?
            .set_default("thresholds.wind_kmh.severe", 90.0)?
            .set_default("thresholds.precipitation_mm.low", 10.0)?
            .set_default("thresholds.precipitation_mm.moderate", 25.0)?
            .set_default("thresholds.precipitation_mm.high", 50.0)?
            .set_default("thresholds.precipitation_mm.severe", 100.0)?
            .set_default("thresholds.flood_probability", 0.5)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WPS_ prefix)
            .add_source(
                Environment::with_prefix("WPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: Config = config.try_deserialize()?;

        if loaded.engine.retention_days < MIN_RETENTION_DAYS {
            tracing::warn!(
                configured = loaded.engine.retention_days,
                floor = MIN_RETENTION_DAYS,
                "retention_days below the supported floor, clamping"
            );
            loaded.engine.retention_days = MIN_RETENTION_DAYS;
        }

        Ok(loaded)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            engine: EngineConfig::default(),
            thresholds: SeverityThresholds::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_interval_minutes: 60,
            retrain_interval_hours: 168,
            low_confidence_threshold: 0.70,
            accuracy_alert_floor: 0.70,
            min_predictions_for_alert: 10,
            retention_days: 90,
            min_window_observations: 72,
            stale_after_hours: 6,
            forecast_cache_minutes: 30,
            default_forecast_days: 7,
            model_seed: 42,
        }
    }
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            heat_celsius: SeverityBands {
                low: 30.0,
                moderate: 35.0,
                high: 40.0,
                severe: 45.0,
            },
            cold_celsius: SeverityBands {
                low: 0.0,
                moderate: -10.0,
                high: -20.0,
                severe: -30.0,
            },
            wind_kmh: SeverityBands {
                low: 36.0,
                moderate: 54.0,
                high: 72.0,
                severe: 90.0,
            },
            precipitation_mm: SeverityBands {
                low: 10.0,
                moderate: 25.0,
                high: 50.0,
                severe: 100.0,
            },
            flood_probability: 0.5,
        }
    }
}
