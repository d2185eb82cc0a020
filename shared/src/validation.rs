//! Validation utilities for the Weather Prediction System
//!
//! Range checks mirror what the data collector is allowed to deliver;
//! anything outside these bounds is a collector bug, not weather.

use crate::models::{Forecast, Observation, WeatherWarning};

// ============================================================================
// Coordinate Validations
// ============================================================================

/// Validate latitude is within [-90, 90]
pub fn validate_latitude(latitude: f64) -> Result<(), &'static str> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err("Latitude must be between -90 and 90");
    }
    Ok(())
}

/// Validate longitude is within [-180, 180]
pub fn validate_longitude(longitude: f64) -> Result<(), &'static str> {
    if !(-180.0..=180.0).contains(&longitude) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

/// Validate a location has usable coordinates and a city name
pub fn validate_location(location: &crate::types::Location) -> Result<(), &'static str> {
    validate_latitude(location.latitude)?;
    validate_longitude(location.longitude)?;
    if location.city.trim().is_empty() {
        return Err("City name must not be empty");
    }
    Ok(())
}

// ============================================================================
// Observation Validations
// ============================================================================

/// Validate an observation's measurements are physically plausible
pub fn validate_observation(obs: &Observation) -> Result<(), &'static str> {
    validate_location(&obs.location)?;
    if !(-100.0..=60.0).contains(&obs.temperature) {
        return Err("Temperature must be between -100°C and 60°C");
    }
    if !(0.0..=100.0).contains(&obs.humidity) {
        return Err("Humidity must be between 0 and 100%");
    }
    if obs.pressure <= 0.0 {
        return Err("Pressure must be positive");
    }
    if !(0.0..150.0).contains(&obs.wind_speed) {
        return Err("Wind speed must be between 0 and 150 m/s");
    }
    if !(0.0..=360.0).contains(&obs.wind_direction) {
        return Err("Wind direction must be between 0 and 360 degrees");
    }
    if obs.precipitation < 0.0 {
        return Err("Precipitation cannot be negative");
    }
    if !(0.0..=100.0).contains(&obs.cloud_cover) {
        return Err("Cloud cover must be between 0 and 100%");
    }
    Ok(())
}

// ============================================================================
// Forecast Validations
// ============================================================================

/// Validate a forecast satisfies its structural invariants
pub fn validate_forecast(forecast: &Forecast) -> Result<(), &'static str> {
    validate_location(&forecast.location)?;
    if forecast.predicted_temperature_high < forecast.predicted_temperature_low {
        return Err("High temperature must be greater than or equal to low temperature");
    }
    if !(0.0..=1.0).contains(&forecast.precipitation_probability) {
        return Err("Precipitation probability must be between 0 and 1");
    }
    if !(0.0..=1.0).contains(&forecast.confidence_score) {
        return Err("Confidence score must be between 0 and 1");
    }
    if forecast.predicted_precipitation_mm < 0.0 {
        return Err("Predicted precipitation cannot be negative");
    }
    if forecast.predicted_wind_speed_kmh < 0.0 {
        return Err("Predicted wind speed cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Warning Validations
// ============================================================================

/// Validate a warning carries the fields downstream consumers rely on
pub fn validate_warning(warning: &WeatherWarning) -> Result<(), &'static str> {
    if warning.title.trim().is_empty() {
        return Err("Warning title must not be empty");
    }
    if warning.safety_recommendations.is_empty() {
        return Err("Warning must carry at least one safety recommendation");
    }
    if warning.end_time <= warning.start_time {
        return Err("End time must be after start time");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeatherCondition;
    use crate::types::Location;
    use chrono::{TimeZone, Utc};

    fn seattle() -> Location {
        Location::new(47.6062, -122.3321, "Seattle", "United States")
    }

    fn observation() -> Observation {
        Observation {
            location: seattle(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            temperature: 15.5,
            humidity: 65.0,
            pressure: 1013.25,
            wind_speed: 5.2,
            wind_direction: 180.0,
            precipitation: 0.0,
            cloud_cover: 40.0,
            condition: WeatherCondition::PartlyCloudy,
        }
    }

    #[test]
    fn valid_observation_passes() {
        assert!(validate_observation(&observation()).is_ok());
    }

    #[test]
    fn out_of_range_temperature_fails() {
        let mut obs = observation();
        obs.temperature = 75.0;
        assert!(validate_observation(&obs).is_err());
    }

    #[test]
    fn hurricane_force_wind_fails() {
        let mut obs = observation();
        obs.wind_speed = 150.0;
        assert!(validate_observation(&obs).is_err());
    }

    #[test]
    fn latitude_bounds() {
        assert!(validate_latitude(90.0).is_ok());
        assert!(validate_latitude(-90.0).is_ok());
        assert!(validate_latitude(90.1).is_err());
    }
}
