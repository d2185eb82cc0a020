//! Weather observation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::WeatherCondition;
use crate::types::Location;

/// A single weather observation produced by the data collector
///
/// Immutable once stored. Units: °C, %, hPa, m/s, degrees, mm, %.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub location: Location,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub precipitation: f64,
    pub cloud_cover: f64,
    pub condition: WeatherCondition,
}

impl Observation {
    /// Whether measurable rain fell during this observation
    pub fn had_rain(&self) -> bool {
        self.precipitation > 0.0
    }
}
