//! Prediction accuracy models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Location;

/// Daily aggregate of forecast error statistics
///
/// One record per calendar day per evaluation run, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyMetric {
    /// The forecast target date the outcomes were recorded against
    pub date: NaiveDate,
    pub temperature_mae: f64,
    pub temperature_rmse: f64,
    /// Hit rate of the rain/no-rain call, 0-1
    pub precipitation_accuracy: f64,
    /// Condition label accuracy including partial group matches, 0-1
    pub condition_accuracy: f64,
    /// Weighted composite of the per-record accuracy scores, 0-1
    pub overall_accuracy: f64,
    pub total_predictions: usize,
    pub calculated_at: DateTime<Utc>,
}

/// Structured accuracy-degradation event
///
/// Raised by the tracker when trailing accuracy falls below the configured
/// floor. An operational signal, not a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyAlert {
    pub location: Option<Location>,
    pub window_days: u32,
    pub overall_accuracy: f64,
    pub floor: f64,
    pub total_predictions: usize,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}
