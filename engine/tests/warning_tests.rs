//! Warning generation integration tests
//!
//! Covers threshold-driven classification, recommendation guarantees and
//! the independence of warnings for compound conditions.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;

use shared::{Forecast, Location, SeverityLevel, WarningType, WeatherCondition};
use weather_prediction_engine::config::{SeverityBands, SeverityThresholds};
use weather_prediction_engine::services::warnings::{SeverityClassifier, WarningGenerator};

fn seattle() -> Location {
    Location::new(47.6062, -122.3321, "Seattle", "United States")
}

fn forecast(high: f64, low: f64, wind_kmh: f64, precip_mm: f64, pop: f64) -> Forecast {
    Forecast {
        location: seattle(),
        forecast_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        predicted_temperature_high: high,
        predicted_temperature_low: low,
        precipitation_probability: pop,
        predicted_precipitation_mm: precip_mm,
        predicted_wind_speed_kmh: wind_kmh,
        weather_condition: WeatherCondition::Cloudy,
        confidence_score: 0.8,
        low_confidence: false,
        generated_at: Utc::now(),
    }
}

/// Threshold table with the wind qualification bound at 60 km/h
fn thresholds_with_wind_floor_60() -> SeverityThresholds {
    SeverityThresholds {
        wind_kmh: SeverityBands {
            low: 60.0,
            moderate: 75.0,
            high: 90.0,
            severe: 110.0,
        },
        ..SeverityThresholds::default()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn wind_at_70_with_floor_60_yields_exactly_one_wind_warning() {
    let generator = WarningGenerator::new(thresholds_with_wind_floor_60());

    let warnings = generator.analyze_forecasts(&[forecast(20.0, 12.0, 70.0, 0.0, 0.0)]);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].warning_type, WarningType::HighWind);
    assert!(!warnings[0].safety_recommendations.is_empty());
}

#[test]
fn calm_wind_yields_no_warning() {
    let generator = WarningGenerator::new(thresholds_with_wind_floor_60());

    let warnings = generator.analyze_forecasts(&[forecast(20.0, 12.0, 10.0, 0.0, 0.0)]);
    assert!(warnings.is_empty());
}

#[test]
fn qualifying_days_each_get_their_own_warning() {
    let generator = WarningGenerator::new(SeverityThresholds::default());

    let mut hot_day = forecast(41.0, 25.0, 10.0, 0.0, 0.0);
    hot_day.forecast_date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    let mut windy_day = forecast(22.0, 12.0, 80.0, 0.0, 0.0);
    windy_day.forecast_date = NaiveDate::from_ymd_opt(2024, 6, 11).unwrap();

    let warnings = generator.analyze_forecasts(&[hot_day, windy_day]);
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].warning_type, WarningType::ExtremeHeat);
    assert_eq!(warnings[1].warning_type, WarningType::HighWind);
    assert_ne!(warnings[0].start_time, warnings[1].start_time);
}

#[test]
fn storm_needs_wind_and_rain_together() {
    let generator = WarningGenerator::new(SeverityThresholds::default());

    // Wind alone, no storm
    let windy = generator.analyze_forecasts(&[forecast(20.0, 12.0, 60.0, 0.0, 0.0)]);
    assert!(windy.iter().all(|w| w.warning_type != WarningType::Storm));

    // Wind and substantial rain together
    let stormy = generator.analyze_forecasts(&[forecast(20.0, 12.0, 60.0, 30.0, 0.9)]);
    assert!(stormy.iter().any(|w| w.warning_type == WarningType::Storm));
}

#[test]
fn titles_carry_severity_and_type() {
    let generator = WarningGenerator::new(SeverityThresholds::default());
    let warnings = generator.analyze_forecasts(&[forecast(46.0, 25.0, 10.0, 0.0, 0.0)]);

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, SeverityLevel::Severe);
    assert_eq!(warnings[0].title, "Severe Extreme Heat Warning");
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn wind_strategy() -> impl Strategy<Value = f64> {
    0.0f64..200.0
}

fn temperature_strategy() -> impl Strategy<Value = f64> {
    -50.0f64..55.0
}

fn precipitation_strategy() -> impl Strategy<Value = f64> {
    0.0f64..150.0
}

fn probability_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=1.0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Wind severity is monotone in wind speed
    #[test]
    fn prop_wind_severity_is_monotone(a in wind_strategy(), b in wind_strategy()) {
        let classifier = SeverityClassifier::new(SeverityThresholds::default());
        let (slow, fast) = if a <= b { (a, b) } else { (b, a) };

        let slow_severity = classifier.classify_wind(slow);
        let fast_severity = classifier.classify_wind(fast);

        match (slow_severity, fast_severity) {
            (Some(s), Some(f)) => prop_assert!(s <= f),
            (Some(_), None) => prop_assert!(false, "severity vanished as wind grew"),
            _ => {}
        }
    }

    /// Every generated warning is structurally sound
    #[test]
    fn prop_generated_warnings_are_well_formed(
        high in temperature_strategy(),
        wind in wind_strategy(),
        precip in precipitation_strategy(),
        pop in probability_strategy()
    ) {
        let generator = WarningGenerator::new(SeverityThresholds::default());
        let low = high - 8.0;
        let warnings = generator.analyze_forecasts(&[forecast(high, low, wind, precip, pop)]);

        for warning in &warnings {
            prop_assert!(!warning.safety_recommendations.is_empty());
            prop_assert!(!warning.title.is_empty());
            prop_assert!(warning.end_time > warning.start_time);
            prop_assert!(shared::validate_warning(warning).is_ok());
        }
    }

    /// Sub-threshold conditions never fabricate a warning
    #[test]
    fn prop_quiet_weather_stays_quiet(
        high in 5.0f64..25.0,
        wind in 0.0f64..30.0,
        precip in 0.0f64..5.0
    ) {
        let generator = WarningGenerator::new(SeverityThresholds::default());
        let warnings = generator.analyze_forecasts(&[forecast(high, high - 4.0, wind, precip, 0.2)]);
        prop_assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    /// Overall severity equals the strongest dimension
    #[test]
    fn prop_overall_severity_dominates_dimensions(
        high in temperature_strategy(),
        wind in wind_strategy(),
        precip in precipitation_strategy()
    ) {
        let classifier = SeverityClassifier::new(SeverityThresholds::default());
        let f = forecast(high, high - 8.0, wind, precip, 0.5);
        let overall = classifier.classify_severity(&f);

        for dimension in [
            classifier.classify_heat(f.predicted_temperature_high),
            classifier.classify_cold(f.predicted_temperature_low),
            classifier.classify_wind(f.predicted_wind_speed_kmh),
            classifier.classify_precipitation(f.predicted_precipitation_mm),
        ]
        .into_iter()
        .flatten()
        {
            prop_assert!(overall >= dimension);
        }
    }
}
