//! Safety warning models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Location;

/// Types of weather warnings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    Storm,
    ExtremeHeat,
    ExtremeCold,
    Flood,
    HighWind,
    AirQuality,
}

impl WarningType {
    pub fn label(&self) -> &'static str {
        match self {
            WarningType::Storm => "Storm",
            WarningType::ExtremeHeat => "Extreme Heat",
            WarningType::ExtremeCold => "Extreme Cold",
            WarningType::Flood => "Flood",
            WarningType::HighWind => "High Wind",
            WarningType::AirQuality => "Air Quality",
        }
    }
}

/// Warning severity, totally ordered from Low to Severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl SeverityLevel {
    pub fn label(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "Low",
            SeverityLevel::Moderate => "Moderate",
            SeverityLevel::High => "High",
            SeverityLevel::Severe => "Severe",
        }
    }
}

/// A typed, severity-ranked safety warning derived from forecasts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherWarning {
    pub id: Uuid,
    pub location: Location,
    pub warning_type: WarningType,
    pub severity: SeverityLevel,
    pub title: String,
    pub description: String,
    /// Always contains at least one entry
    pub safety_recommendations: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}
