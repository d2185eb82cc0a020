//! Severity classification and safety warning generation
//!
//! Pure, stateless rule evaluation over forecasts. Thresholds come from
//! configuration (`SeverityThresholds`), recommendations from a
//! type+severity indexed table; generation is a loop over the rule table,
//! not a ladder of conditionals.

use chrono::{Duration, Utc};
use uuid::Uuid;

use shared::{Forecast, SeverityLevel, WarningType, WeatherWarning};

use crate::config::{SeverityBands, SeverityThresholds};

/// Classifies forecasted conditions into severity levels
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    thresholds: SeverityThresholds,
}

impl SeverityClassifier {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn classify_heat(&self, temp_high: f64) -> Option<SeverityLevel> {
        band_ascending(&self.thresholds.heat_celsius, temp_high)
    }

    pub fn classify_cold(&self, temp_low: f64) -> Option<SeverityLevel> {
        band_descending(&self.thresholds.cold_celsius, temp_low)
    }

    pub fn classify_wind(&self, wind_kmh: f64) -> Option<SeverityLevel> {
        band_ascending(&self.thresholds.wind_kmh, wind_kmh)
    }

    pub fn classify_precipitation(&self, volume_mm: f64) -> Option<SeverityLevel> {
        band_ascending(&self.thresholds.precipitation_mm, volume_mm)
    }

    pub fn flood_probability(&self) -> f64 {
        self.thresholds.flood_probability
    }

    /// Overall severity of a forecast: the highest level any dimension
    /// reaches, Low when nothing qualifies
    pub fn classify_severity(&self, forecast: &Forecast) -> SeverityLevel {
        [
            self.classify_heat(forecast.predicted_temperature_high),
            self.classify_cold(forecast.predicted_temperature_low),
            self.classify_wind(forecast.predicted_wind_speed_kmh),
            self.classify_precipitation(forecast.predicted_precipitation_mm),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(SeverityLevel::Low)
    }
}

/// Severity for a "bigger is worse" dimension
fn band_ascending(bands: &SeverityBands, value: f64) -> Option<SeverityLevel> {
    if value >= bands.severe {
        Some(SeverityLevel::Severe)
    } else if value >= bands.high {
        Some(SeverityLevel::High)
    } else if value >= bands.moderate {
        Some(SeverityLevel::Moderate)
    } else if value >= bands.low {
        Some(SeverityLevel::Low)
    } else {
        None
    }
}

/// Severity for a "smaller is worse" dimension
fn band_descending(bands: &SeverityBands, value: f64) -> Option<SeverityLevel> {
    if value <= bands.severe {
        Some(SeverityLevel::Severe)
    } else if value <= bands.high {
        Some(SeverityLevel::High)
    } else if value <= bands.moderate {
        Some(SeverityLevel::Moderate)
    } else if value <= bands.low {
        Some(SeverityLevel::Low)
    } else {
        None
    }
}

/// Safety recommendations indexed by warning type and severity
///
/// Unknown combinations fall back to a generic list, so every warning
/// carries at least one recommendation.
pub fn recommendations(warning_type: WarningType, severity: SeverityLevel) -> Vec<String> {
    let texts: &[&str] = match (warning_type, severity) {
        (WarningType::ExtremeHeat, SeverityLevel::Low) => &[
            "Stay hydrated by drinking plenty of water",
            "Avoid prolonged outdoor activities during peak hours",
            "Wear light-colored, loose-fitting clothing",
        ],
        (WarningType::ExtremeHeat, SeverityLevel::Moderate) => &[
            "Limit outdoor activities to early morning or evening",
            "Drink water regularly, even if not thirsty",
            "Seek air-conditioned spaces during the hottest part of the day",
            "Check on elderly neighbors and relatives",
        ],
        (WarningType::ExtremeHeat, SeverityLevel::High) => &[
            "Avoid outdoor activities during daytime hours",
            "Stay in air-conditioned buildings when possible",
            "Never leave children or pets in vehicles",
            "Watch for signs of heat exhaustion and heat stroke",
        ],
        (WarningType::ExtremeHeat, SeverityLevel::Severe) => &[
            "Stay indoors in air-conditioned spaces",
            "Avoid all non-essential outdoor activities",
            "Seek immediate medical attention for heat-related illness",
            "Check on vulnerable community members frequently",
        ],
        (WarningType::ExtremeCold, SeverityLevel::Low) => &[
            "Dress in layers when heading outside",
            "Protect pipes and outdoor taps from freezing",
        ],
        (WarningType::ExtremeCold, SeverityLevel::Moderate) => &[
            "Limit time outdoors and cover exposed skin",
            "Check heating fuel supplies",
            "Check on elderly neighbors and relatives",
        ],
        (WarningType::ExtremeCold, SeverityLevel::High) => &[
            "Avoid unnecessary time outdoors",
            "Watch for signs of frostbite and hypothermia",
            "Keep emergency heating options ready",
        ],
        (WarningType::ExtremeCold, SeverityLevel::Severe) => &[
            "Stay indoors; exposed skin can freeze in minutes",
            "Seek immediate medical attention for hypothermia symptoms",
            "Check on vulnerable community members frequently",
        ],
        (WarningType::HighWind, SeverityLevel::Low) => &[
            "Secure loose outdoor objects",
            "Be cautious when driving high-profile vehicles",
        ],
        (WarningType::HighWind, SeverityLevel::Moderate) => &[
            "Secure or bring indoors all loose outdoor items",
            "Stay away from trees and power lines",
            "Postpone outdoor recreational activities",
        ],
        (WarningType::HighWind, SeverityLevel::High) => &[
            "Avoid unnecessary travel",
            "Stay indoors and away from windows",
            "Be prepared for possible power outages",
        ],
        (WarningType::HighWind, SeverityLevel::Severe) => &[
            "Stay indoors and avoid travel",
            "Move to interior rooms away from windows",
            "Expect widespread power outages",
        ],
        (WarningType::Flood, SeverityLevel::Low) => &[
            "Avoid low-lying areas and underpasses",
            "Monitor local weather updates",
        ],
        (WarningType::Flood, SeverityLevel::Moderate) => &[
            "Avoid driving through flooded roads",
            "Move to higher ground if in flood-prone areas",
            "Monitor emergency broadcasts",
        ],
        (WarningType::Flood, SeverityLevel::High) => &[
            "Evacuate flood-prone areas immediately",
            "Never drive through flooded roads",
            "Have emergency supplies and communication ready",
        ],
        (WarningType::Flood, SeverityLevel::Severe) => &[
            "Evacuate immediately if ordered by authorities",
            "Move to highest available ground",
            "Do not return to evacuated areas until cleared by officials",
        ],
        (WarningType::Storm, SeverityLevel::Low) => &[
            "Secure loose outdoor objects",
            "Monitor weather updates",
        ],
        (WarningType::Storm, SeverityLevel::Moderate) => &[
            "Stay indoors during the storm",
            "Stay away from windows and doors",
            "Have flashlights and batteries ready",
        ],
        (WarningType::Storm, SeverityLevel::High) => &[
            "Stay indoors in interior rooms",
            "Avoid windows and electrical equipment",
            "Be prepared for power outages",
        ],
        (WarningType::Storm, SeverityLevel::Severe) => &[
            "Take shelter in interior rooms on the lowest floor",
            "Stay away from windows, doors, and electrical equipment",
            "Follow emergency broadcasts and evacuation orders",
        ],
        // No curated list for this combination yet
        _ => &[
            "Monitor weather conditions closely",
            "Follow guidance from local authorities",
            "Have emergency supplies ready",
        ],
    };
    texts.iter().map(|t| t.to_string()).collect()
}

/// A qualifying rule match for one forecast day
struct RuleMatch {
    severity: SeverityLevel,
    description: String,
}

type RuleEval = fn(&SeverityClassifier, &Forecast) -> Option<RuleMatch>;

/// Generates typed safety warnings from forecast batches
#[derive(Debug, Clone)]
pub struct WarningGenerator {
    classifier: SeverityClassifier,
    rules: Vec<(WarningType, RuleEval)>,
}

impl WarningGenerator {
    pub fn new(thresholds: SeverityThresholds) -> Self {
        // air_quality has no default rule; operators can add one by
        // extending this table
        let rules: Vec<(WarningType, RuleEval)> = vec![
            (WarningType::ExtremeHeat, eval_heat),
            (WarningType::ExtremeCold, eval_cold),
            (WarningType::HighWind, eval_wind),
            (WarningType::Flood, eval_flood),
            (WarningType::Storm, eval_storm),
        ];
        Self {
            classifier: SeverityClassifier::new(thresholds),
            rules,
        }
    }

    pub fn classifier(&self) -> &SeverityClassifier {
        &self.classifier
    }

    /// Evaluate every rule against every forecast day
    ///
    /// Each qualifying (day, rule) pair yields its own warning record, so
    /// severity attribution stays unambiguous. No qualifying day yields an
    /// empty vec, never a fabricated warning.
    pub fn analyze_forecasts(&self, forecasts: &[Forecast]) -> Vec<WeatherWarning> {
        let mut warnings = Vec::new();

        for forecast in forecasts {
            for (warning_type, eval) in &self.rules {
                if let Some(matched) = eval(&self.classifier, forecast) {
                    warnings.push(self.build_warning(forecast, *warning_type, matched));
                }
            }
        }

        warnings
    }

    fn build_warning(
        &self,
        forecast: &Forecast,
        warning_type: WarningType,
        matched: RuleMatch,
    ) -> WeatherWarning {
        let start_time = forecast
            .forecast_date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);

        WeatherWarning {
            id: Uuid::new_v4(),
            location: forecast.location.clone(),
            warning_type,
            severity: matched.severity,
            title: format!("{} {} Warning", matched.severity.label(), warning_type.label()),
            description: matched.description,
            safety_recommendations: recommendations(warning_type, matched.severity),
            start_time,
            end_time: start_time + Duration::hours(24),
            issued_at: Utc::now(),
        }
    }
}

fn eval_heat(classifier: &SeverityClassifier, forecast: &Forecast) -> Option<RuleMatch> {
    classifier
        .classify_heat(forecast.predicted_temperature_high)
        .map(|severity| RuleMatch {
            severity,
            description: format!(
                "High temperatures of {:.1}°C expected. Heat-related health risks possible.",
                forecast.predicted_temperature_high
            ),
        })
}

fn eval_cold(classifier: &SeverityClassifier, forecast: &Forecast) -> Option<RuleMatch> {
    classifier
        .classify_cold(forecast.predicted_temperature_low)
        .map(|severity| RuleMatch {
            severity,
            description: format!(
                "Low temperatures of {:.1}°C expected. Cold-related health risks possible.",
                forecast.predicted_temperature_low
            ),
        })
}

fn eval_wind(classifier: &SeverityClassifier, forecast: &Forecast) -> Option<RuleMatch> {
    classifier
        .classify_wind(forecast.predicted_wind_speed_kmh)
        .map(|severity| RuleMatch {
            severity,
            description: format!(
                "High winds of {:.1} km/h expected. Travel and outdoor activities may be affected.",
                forecast.predicted_wind_speed_kmh
            ),
        })
}

fn eval_flood(classifier: &SeverityClassifier, forecast: &Forecast) -> Option<RuleMatch> {
    if forecast.precipitation_probability < classifier.flood_probability() {
        return None;
    }
    classifier
        .classify_precipitation(forecast.predicted_precipitation_mm)
        .map(|severity| RuleMatch {
            severity,
            description: format!(
                "Heavy precipitation of {:.1}mm expected. Flooding possible in low-lying areas.",
                forecast.predicted_precipitation_mm
            ),
        })
}

fn eval_storm(classifier: &SeverityClassifier, forecast: &Forecast) -> Option<RuleMatch> {
    let wind = classifier.classify_wind(forecast.predicted_wind_speed_kmh)?;
    let rain = classifier.classify_precipitation(forecast.predicted_precipitation_mm)?;
    // A storm needs both dimensions to be substantial at once
    if wind < SeverityLevel::Moderate || rain < SeverityLevel::Moderate {
        return None;
    }
    Some(RuleMatch {
        severity: wind.max(rain),
        description: format!(
            "Storm conditions expected: winds of {:.1} km/h with {:.1}mm of precipitation.",
            forecast.predicted_wind_speed_kmh, forecast.predicted_precipitation_mm
        ),
    })
}
