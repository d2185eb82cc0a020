//! Forecast models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Location;

/// Predicted weather condition label
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Sunny,
    Clear,
    PartlyCloudy,
    Cloudy,
    Overcast,
    Drizzle,
    Rainy,
    Showers,
    Thunderstorm,
    Snow,
}

/// Coarse grouping of conditions, used for partial-match accuracy scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionGroup {
    Clear,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
}

impl WeatherCondition {
    pub fn group(&self) -> ConditionGroup {
        match self {
            WeatherCondition::Sunny | WeatherCondition::Clear => ConditionGroup::Clear,
            WeatherCondition::PartlyCloudy | WeatherCondition::Cloudy | WeatherCondition::Overcast => {
                ConditionGroup::Cloudy
            }
            WeatherCondition::Drizzle | WeatherCondition::Rainy | WeatherCondition::Showers => {
                ConditionGroup::Rainy
            }
            WeatherCondition::Thunderstorm => ConditionGroup::Stormy,
            WeatherCondition::Snow => ConditionGroup::Snowy,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WeatherCondition::Sunny => "Sunny",
            WeatherCondition::Clear => "Clear",
            WeatherCondition::PartlyCloudy => "Partly Cloudy",
            WeatherCondition::Cloudy => "Cloudy",
            WeatherCondition::Overcast => "Overcast",
            WeatherCondition::Drizzle => "Drizzle",
            WeatherCondition::Rainy => "Rainy",
            WeatherCondition::Showers => "Showers",
            WeatherCondition::Thunderstorm => "Thunderstorm",
            WeatherCondition::Snow => "Snow",
        }
    }
}

/// A single day's forecast for one location
///
/// Created by the prediction engine and immutable afterwards; a later
/// generation batch supersedes it rather than mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub location: Location,
    pub forecast_date: NaiveDate,
    /// Predicted daily high in °C
    pub predicted_temperature_high: f64,
    /// Predicted daily low in °C
    pub predicted_temperature_low: f64,
    /// Probability of measurable precipitation, 0-1
    pub precipitation_probability: f64,
    /// Expected precipitation volume in mm
    pub predicted_precipitation_mm: f64,
    /// Expected peak wind speed in km/h
    pub predicted_wind_speed_kmh: f64,
    pub weather_condition: WeatherCondition,
    /// Calibrated reliability estimate, 0-1
    pub confidence_score: f64,
    /// Set when confidence_score falls below the configured threshold
    pub low_confidence: bool,
    pub generated_at: DateTime<Utc>,
}

impl Forecast {
    /// Whether rain is the more likely outcome for this day
    pub fn rain_expected(&self) -> bool {
        self.precipitation_probability >= 0.5
    }
}
