//! Feature extraction from observation windows
//!
//! Turns a window of raw observations into the numeric feature vector the
//! ensemble consumes. Normalization parameters are fitted once at training
//! time, stored in the model snapshot, and reapplied unchanged at inference
//! time so the two paths never skew apart.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use shared::{Location, Observation};

use crate::error::{AppError, AppResult};

/// Tolerance when matching lag observations to their nominal timestamp
const LAG_TOLERANCE_HOURS: i64 = 2;

/// Ordered feature names; indices must match `FeatureVector::values`
pub const FEATURE_NAMES: [&str; 15] = [
    "temp_mean_24h",
    "temp_trend",
    "temp_variance",
    "humidity_mean_24h",
    "pressure_mean_24h",
    "pressure_trend",
    "wind_speed_mean_24h",
    "cloud_cover_mean_24h",
    "precipitation_sum_24h",
    "temp_same_hour_yesterday",
    "temp_same_hour_last_week",
    "day_of_year_sin",
    "day_of_year_cos",
    "hour_of_day",
    "latitude",
];

/// Ordered numeric features for one (location, reference time)
///
/// Owned transiently by the prediction or training call; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Extraction result: the vector plus window-quality flags
#[derive(Debug, Clone)]
pub struct ExtractedFeatures {
    pub vector: FeatureVector,
    /// The newest observation was older than the configured staleness bound
    pub stale: bool,
}

/// Z-score normalization parameters, fitted at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Normalization {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Normalization {
    /// Fit per-feature mean and standard deviation over a training matrix
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let width = rows.first().map(FeatureVector::len).unwrap_or(0);
        let mut means = vec![0.0; width];
        let mut stds = vec![0.0; width];
        if rows.is_empty() {
            return Self { means, stds };
        }

        let n = rows.len() as f64;
        for row in rows {
            for (i, v) in row.values.iter().enumerate() {
                means[i] += v / n;
            }
        }
        for row in rows {
            for (i, v) in row.values.iter().enumerate() {
                stds[i] += (v - means[i]).powi(2) / n;
            }
        }
        for s in &mut stds {
            *s = s.sqrt();
        }
        Self { means, stds }
    }

    /// Apply the fitted parameters; constant features map to 0
    pub fn apply(&self, vector: &FeatureVector) -> Vec<f64> {
        vector
            .values
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(v, (mean, std))| {
                if std.abs() < 1e-10 {
                    0.0
                } else {
                    (v - mean) / std
                }
            })
            .collect()
    }
}

/// Extracts feature vectors from observation windows
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    min_window: usize,
    stale_after: Duration,
}

impl FeatureExtractor {
    pub fn new(min_window: usize, stale_after_hours: i64) -> Self {
        Self {
            min_window,
            stale_after: Duration::hours(stale_after_hours),
        }
    }

    /// Extract features for `location` as of `as_of` from `window`
    ///
    /// The window must hold at least the configured minimum number of
    /// observations; fabricating values for a thin window would poison the
    /// model, so the call fails instead and the caller falls back to the
    /// climatology baseline.
    pub fn extract(
        &self,
        location: &Location,
        as_of: DateTime<Utc>,
        window: &[Observation],
    ) -> AppResult<ExtractedFeatures> {
        if window.len() < self.min_window {
            return Err(AppError::InsufficientData {
                required: self.min_window,
                available: window.len(),
            });
        }

        let mut recent: Vec<&Observation> = window
            .iter()
            .filter(|o| o.timestamp > as_of - Duration::hours(24) && o.timestamp <= as_of)
            .collect();
        if recent.is_empty() {
            // Window lies entirely in the past; use its most recent day
            recent = window.iter().rev().take(24).collect();
            recent.reverse();
        }

        let temps: Vec<f64> = recent.iter().map(|o| o.temperature).collect();
        let pressures: Vec<f64> = recent.iter().map(|o| o.pressure).collect();
        let hours: Vec<f64> = recent
            .iter()
            .map(|o| (o.timestamp - as_of).num_minutes() as f64 / 60.0)
            .collect();

        let temp_mean = mean(&temps);
        let values = vec![
            temp_mean,
            trend_slope(&hours, &temps),
            variance(&temps),
            mean(&recent.iter().map(|o| o.humidity).collect::<Vec<_>>()),
            mean(&pressures),
            trend_slope(&hours, &pressures),
            mean(&recent.iter().map(|o| o.wind_speed).collect::<Vec<_>>()),
            mean(&recent.iter().map(|o| o.cloud_cover).collect::<Vec<_>>()),
            recent.iter().map(|o| o.precipitation).sum(),
            lag_temperature(window, as_of - Duration::hours(24)).unwrap_or(temp_mean),
            lag_temperature(window, as_of - Duration::days(7)).unwrap_or(temp_mean),
            seasonal_sin(as_of),
            seasonal_cos(as_of),
            as_of.hour() as f64,
            location.latitude,
        ];

        let newest = window
            .iter()
            .map(|o| o.timestamp)
            .max()
            .unwrap_or(as_of - self.stale_after);
        let stale = as_of - newest > self.stale_after;

        Ok(ExtractedFeatures {
            vector: FeatureVector { values },
            stale,
        })
    }
}

/// Temperature of the observation nearest to `target`, within tolerance
fn lag_temperature(window: &[Observation], target: DateTime<Utc>) -> Option<f64> {
    window
        .iter()
        .filter(|o| (o.timestamp - target).num_hours().abs() <= LAG_TOLERANCE_HOURS)
        .min_by_key(|o| (o.timestamp - target).num_seconds().abs())
        .map(|o| o.temperature)
}

fn seasonal_sin(at: DateTime<Utc>) -> f64 {
    let day = at.ordinal0() as f64;
    (2.0 * std::f64::consts::PI * day / 365.0).sin()
}

fn seasonal_cos(at: DateTime<Utc>) -> f64 {
    let day = at.ordinal0() as f64;
    (2.0 * std::f64::consts::PI * day / 365.0).cos()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Least-squares slope of `ys` over `xs`
fn trend_slope(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let mx = mean(xs);
    let my = mean(ys);
    let denom: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if denom.abs() < 1e-10 {
        return 0.0;
    }
    let num: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    num / denom
}
