//! Prediction accuracy tracking
//!
//! Reconciles past forecasts against later-arriving observations, keeps a
//! rolling ledger of per-record outcomes, aggregates daily error metrics and
//! raises a structured alert when trailing accuracy degrades.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use shared::{AccuracyAlert, AccuracyMetric, Forecast, Location, Observation};

use crate::error::{AppError, AppResult};

/// Weighting of the per-record composite score
const TEMPERATURE_WEIGHT: f64 = 0.4;
const PRECIPITATION_WEIGHT: f64 = 0.3;
const CONDITION_WEIGHT: f64 = 0.3;

/// Temperature error (°C) at which temperature accuracy reaches zero
const MAX_TEMPERATURE_ERROR: f64 = 10.0;

/// Score granted for a condition match within the same coarse group
const PARTIAL_CONDITION_SCORE: f64 = 0.7;

/// Pure error/score arithmetic for forecast-versus-actual pairs
#[derive(Debug, Clone, Default)]
pub struct AccuracyCalculator;

impl AccuracyCalculator {
    /// Temperature accuracy and absolute error; full marks decay linearly
    /// to zero at `MAX_TEMPERATURE_ERROR`
    pub fn temperature_accuracy(&self, predicted: f64, actual: f64) -> (f64, f64) {
        let absolute_error = (predicted - actual).abs();
        let accuracy = (1.0 - absolute_error / MAX_TEMPERATURE_ERROR).max(0.0);
        (accuracy, absolute_error)
    }

    /// Binary-threshold precipitation call: probability ≥ 0.5 must match
    /// whether measurable rain was observed
    pub fn precipitation_hit(&self, predicted_probability: f64, actual_precipitation: f64) -> bool {
        (predicted_probability >= 0.5) == (actual_precipitation > 0.0)
    }

    /// Condition score: exact match 1.0, same coarse group partial credit,
    /// anything else zero
    pub fn condition_accuracy(
        &self,
        predicted: shared::WeatherCondition,
        actual: shared::WeatherCondition,
    ) -> (f64, bool) {
        if predicted == actual {
            (1.0, true)
        } else if predicted.group() == actual.group() {
            (PARTIAL_CONDITION_SCORE, false)
        } else {
            (0.0, false)
        }
    }

    pub fn overall(&self, temperature: f64, precipitation: f64, condition: f64) -> f64 {
        temperature * TEMPERATURE_WEIGHT
            + precipitation * PRECIPITATION_WEIGHT
            + condition * CONDITION_WEIGHT
    }

    pub fn mae(&self, errors: &[f64]) -> f64 {
        if errors.is_empty() {
            return 0.0;
        }
        errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64
    }

    pub fn rmse(&self, errors: &[f64]) -> f64 {
        if errors.is_empty() {
            return 0.0;
        }
        let mse = errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64;
        mse.sqrt()
    }
}

/// One reconciled forecast/actual pair
#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub forecast: Forecast,
    pub actual: Observation,
    pub accuracy_score: f64,
    pub temperature_error: f64,
    pub precipitation_hit: bool,
    pub condition_match: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Tracks and analyzes prediction accuracy over time
pub struct AccuracyTracker {
    calculator: AccuracyCalculator,
    retention_days: u32,
    alert_floor: f64,
    min_predictions_for_alert: usize,
    /// Outcomes per location cache key; the mutex serializes appends
    outcomes: Mutex<HashMap<String, Vec<PredictionOutcome>>>,
    /// Append-only daily metric ledger
    history: Mutex<Vec<AccuracyMetric>>,
}

impl AccuracyTracker {
    pub fn new(retention_days: u32, alert_floor: f64, min_predictions_for_alert: usize) -> Self {
        Self {
            calculator: AccuracyCalculator,
            retention_days,
            alert_floor,
            min_predictions_for_alert,
            outcomes: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Record the outcome of one forecast once its actual observation arrived
    pub fn record_outcome(&self, forecast: &Forecast, actual: &Observation) -> AppResult<()> {
        if forecast.location != actual.location {
            return Err(AppError::InvalidLocation(format!(
                "forecast for {} reconciled against observation from {}",
                forecast.location, actual.location
            )));
        }

        let (temp_accuracy, temp_error) = self
            .calculator
            .temperature_accuracy(forecast.predicted_temperature_high, actual.temperature);
        let hit = self
            .calculator
            .precipitation_hit(forecast.precipitation_probability, actual.precipitation);
        let (condition_score, condition_match) = self
            .calculator
            .condition_accuracy(forecast.weather_condition, actual.condition);

        let overall = self.calculator.overall(
            temp_accuracy,
            if hit { 1.0 } else { 0.0 },
            condition_score,
        );

        let outcome = PredictionOutcome {
            forecast: forecast.clone(),
            actual: actual.clone(),
            accuracy_score: overall,
            temperature_error: temp_error,
            precipitation_hit: hit,
            condition_match,
            recorded_at: Utc::now(),
        };

        let mut outcomes = self.outcomes.lock().expect("outcome ledger lock poisoned");
        let series = outcomes.entry(forecast.location.cache_key()).or_default();
        series.push(outcome);

        tracing::debug!(
            location = %forecast.location,
            date = %forecast.forecast_date,
            accuracy = overall,
            "recorded prediction outcome"
        );
        Ok(())
    }

    /// Aggregate every outcome targeting `date` into one daily metric
    ///
    /// The metric is appended to the retained history; with no outcomes for
    /// the date it reports zeros with a zero sample count.
    pub fn daily_metrics(&self, date: NaiveDate) -> AccuracyMetric {
        let outcomes = self.outcomes.lock().expect("outcome ledger lock poisoned");
        let records: Vec<&PredictionOutcome> = outcomes
            .values()
            .flatten()
            .filter(|o| o.forecast.forecast_date == date)
            .collect();

        let metric = if records.is_empty() {
            AccuracyMetric {
                date,
                temperature_mae: 0.0,
                temperature_rmse: 0.0,
                precipitation_accuracy: 0.0,
                condition_accuracy: 0.0,
                overall_accuracy: 0.0,
                total_predictions: 0,
                calculated_at: Utc::now(),
            }
        } else {
            let errors: Vec<f64> = records.iter().map(|o| o.temperature_error).collect();
            let hits = records.iter().filter(|o| o.precipitation_hit).count();
            let matches = records.iter().filter(|o| o.condition_match).count();
            let scores: Vec<f64> = records.iter().map(|o| o.accuracy_score).collect();

            AccuracyMetric {
                date,
                temperature_mae: self.calculator.mae(&errors),
                temperature_rmse: self.calculator.rmse(&errors),
                precipitation_accuracy: hits as f64 / records.len() as f64,
                condition_accuracy: matches as f64 / records.len() as f64,
                overall_accuracy: scores.iter().sum::<f64>() / scores.len() as f64,
                total_predictions: records.len(),
                calculated_at: Utc::now(),
            }
        };
        drop(outcomes);

        let mut history = self.history.lock().expect("metric history lock poisoned");
        history.push(metric.clone());

        metric
    }

    /// Retained daily metrics whose target date falls in the trailing window
    pub fn metrics(&self, days: u32) -> Vec<AccuracyMetric> {
        self.metrics_at(days, Utc::now())
    }

    pub fn metrics_at(&self, days: u32, now: DateTime<Utc>) -> Vec<AccuracyMetric> {
        let cutoff = now.date_naive() - Duration::days(i64::from(days));
        let history = self.history.lock().expect("metric history lock poisoned");
        let mut result: Vec<AccuracyMetric> = history
            .iter()
            .filter(|m| m.date >= cutoff)
            .cloned()
            .collect();
        result.sort_by_key(|m| m.date);
        result
    }

    /// Trailing mean accuracy for one location, feeding confidence
    pub fn recent_accuracy(&self, location: &Location, days: u32) -> Option<f64> {
        self.recent_accuracy_at(location, days, Utc::now())
    }

    pub fn recent_accuracy_at(
        &self,
        location: &Location,
        days: u32,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let cutoff = now.date_naive() - Duration::days(i64::from(days));
        let outcomes = self.outcomes.lock().expect("outcome ledger lock poisoned");
        let scores: Vec<f64> = outcomes
            .get(&location.cache_key())?
            .iter()
            .filter(|o| o.forecast.forecast_date >= cutoff)
            .map(|o| o.accuracy_score)
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Raise a degradation alert when trailing accuracy sinks below the floor
    ///
    /// Returns an event for the scheduler/operators, never an error; thin
    /// samples (< min_predictions_for_alert) stay silent.
    pub fn check_alert_threshold(&self, window_days: u32) -> Option<AccuracyAlert> {
        self.check_alert_threshold_at(window_days, Utc::now())
    }

    pub fn check_alert_threshold_at(
        &self,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Option<AccuracyAlert> {
        let cutoff = now.date_naive() - Duration::days(i64::from(window_days));
        let outcomes = self.outcomes.lock().expect("outcome ledger lock poisoned");
        let scores: Vec<f64> = outcomes
            .values()
            .flatten()
            .filter(|o| o.forecast.forecast_date >= cutoff)
            .map(|o| o.accuracy_score)
            .collect();
        drop(outcomes);

        if scores.len() < self.min_predictions_for_alert {
            return None;
        }
        let overall = scores.iter().sum::<f64>() / scores.len() as f64;
        if overall >= self.alert_floor {
            return None;
        }

        let alert = AccuracyAlert {
            location: None,
            window_days,
            overall_accuracy: overall,
            floor: self.alert_floor,
            total_predictions: scores.len(),
            message: format!(
                "Overall prediction accuracy dropped to {:.1}% (below the {:.1}% floor) over the last {} days",
                overall * 100.0,
                self.alert_floor * 100.0,
                window_days
            ),
            raised_at: Utc::now(),
        };
        tracing::warn!(
            accuracy = overall,
            floor = self.alert_floor,
            samples = alert.total_predictions,
            "accuracy degradation alert raised"
        );
        Some(alert)
    }

    /// Drop records older than the retention window
    ///
    /// Records dated exactly at the window edge survive: retention is a
    /// lower bound, not an expiry.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now.date_naive() - Duration::days(i64::from(self.retention_days));
        let mut removed = 0;

        let mut outcomes = self.outcomes.lock().expect("outcome ledger lock poisoned");
        for series in outcomes.values_mut() {
            let before = series.len();
            series.retain(|o| o.forecast.forecast_date >= cutoff);
            removed += before - series.len();
        }
        outcomes.retain(|_, series| !series.is_empty());
        drop(outcomes);

        let mut history = self.history.lock().expect("metric history lock poisoned");
        let before = history.len();
        history.retain(|m| m.date >= cutoff);
        removed += before - history.len();

        if removed > 0 {
            tracing::info!(removed, "pruned accuracy records beyond retention");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::WeatherCondition;

    fn location() -> Location {
        Location::new(47.6062, -122.3321, "Seattle", "United States")
    }

    fn forecast(date: NaiveDate, high: f64, pop: f64, condition: WeatherCondition) -> Forecast {
        Forecast {
            location: location(),
            forecast_date: date,
            predicted_temperature_high: high,
            predicted_temperature_low: high - 6.0,
            precipitation_probability: pop,
            predicted_precipitation_mm: pop * 10.0,
            predicted_wind_speed_kmh: 12.0,
            weather_condition: condition,
            confidence_score: 0.8,
            low_confidence: false,
            generated_at: Utc::now(),
        }
    }

    fn actual(date: NaiveDate, temperature: f64, precipitation: f64, condition: WeatherCondition) -> Observation {
        Observation {
            location: location(),
            timestamp: date
                .and_hms_opt(12, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap(),
            temperature,
            humidity: 65.0,
            pressure: 1013.0,
            wind_speed: 4.0,
            wind_direction: 90.0,
            precipitation,
            cloud_cover: 50.0,
            condition,
        }
    }

    #[test]
    fn temperature_error_is_absolute_difference() {
        let calc = AccuracyCalculator;
        let (accuracy, error) = calc.temperature_accuracy(25.0, 23.0);
        assert_eq!(error, 2.0);
        assert!((accuracy - 0.8).abs() < 1e-9);
    }

    #[test]
    fn precipitation_hit_is_binary_threshold() {
        let calc = AccuracyCalculator;
        assert!(calc.precipitation_hit(0.7, 3.0)); // rain predicted, rain fell
        assert!(calc.precipitation_hit(0.2, 0.0)); // dry predicted, stayed dry
        assert!(!calc.precipitation_hit(0.7, 0.0)); // rain predicted, stayed dry
        assert!(!calc.precipitation_hit(0.2, 3.0)); // dry predicted, rain fell
    }

    #[test]
    fn condition_partial_credit_within_group() {
        let calc = AccuracyCalculator;
        let (exact, matched) =
            calc.condition_accuracy(WeatherCondition::Rainy, WeatherCondition::Rainy);
        assert_eq!((exact, matched), (1.0, true));

        let (partial, matched) =
            calc.condition_accuracy(WeatherCondition::Rainy, WeatherCondition::Drizzle);
        assert_eq!((partial, matched), (0.7, false));

        let (miss, matched) =
            calc.condition_accuracy(WeatherCondition::Rainy, WeatherCondition::Sunny);
        assert_eq!((miss, matched), (0.0, false));
    }

    #[test]
    fn daily_mae_is_mean_of_absolute_errors() {
        let tracker = AccuracyTracker::new(90, 0.70, 10);
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

        tracker
            .record_outcome(
                &forecast(date, 25.0, 0.2, WeatherCondition::Sunny),
                &actual(date, 23.0, 0.0, WeatherCondition::Sunny),
            )
            .unwrap();
        tracker
            .record_outcome(
                &forecast(date, 18.0, 0.2, WeatherCondition::Cloudy),
                &actual(date, 22.0, 0.0, WeatherCondition::Cloudy),
            )
            .unwrap();

        let metric = tracker.daily_metrics(date);
        assert_eq!(metric.total_predictions, 2);
        assert!((metric.temperature_mae - 3.0).abs() < 1e-9); // (2 + 4) / 2
        let expected_rmse = ((4.0 + 16.0) / 2.0f64).sqrt();
        assert!((metric.temperature_rmse - expected_rmse).abs() < 1e-9);
        assert_eq!(metric.precipitation_accuracy, 1.0);
    }

    #[test]
    fn mismatched_locations_are_rejected() {
        let tracker = AccuracyTracker::new(90, 0.70, 10);
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let mut obs = actual(date, 20.0, 0.0, WeatherCondition::Sunny);
        obs.location = Location::new(40.7128, -74.0060, "New York", "USA");

        let result =
            tracker.record_outcome(&forecast(date, 21.0, 0.1, WeatherCondition::Sunny), &obs);
        assert!(matches!(result, Err(AppError::InvalidLocation(_))));
    }

    #[test]
    fn records_survive_ninety_days_of_retention() {
        let tracker = AccuracyTracker::new(90, 0.70, 10);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        tracker
            .record_outcome(
                &forecast(date, 25.0, 0.2, WeatherCondition::Sunny),
                &actual(date, 24.0, 0.0, WeatherCondition::Sunny),
            )
            .unwrap();
        tracker.daily_metrics(date);

        // Simulated clock: exactly 90 days later, records are still there
        let ninety_days_on = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        tracker.prune_at(ninety_days_on);

        let metrics = tracker.metrics_at(90, ninety_days_on);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].date, date);

        // Beyond the window the record may be compacted away
        let much_later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        tracker.prune_at(much_later);
        assert!(tracker.metrics_at(90, much_later).is_empty());
    }

    #[test]
    fn alert_fires_only_with_enough_bad_samples() {
        let tracker = AccuracyTracker::new(90, 0.70, 10);
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap();

        // Nine badly missed forecasts: below the floor but too few to alert
        for _ in 0..9 {
            tracker
                .record_outcome(
                    &forecast(date, 35.0, 0.9, WeatherCondition::Sunny),
                    &actual(date, 15.0, 0.0, WeatherCondition::Snow),
                )
                .unwrap();
        }
        assert!(tracker.check_alert_threshold_at(7, now).is_none());

        // The tenth pushes the sample count over the guard
        tracker
            .record_outcome(
                &forecast(date, 35.0, 0.9, WeatherCondition::Sunny),
                &actual(date, 15.0, 0.0, WeatherCondition::Snow),
            )
            .unwrap();
        let alert = tracker.check_alert_threshold_at(7, now).unwrap();
        assert!(alert.overall_accuracy < 0.70);
        assert_eq!(alert.total_predictions, 10);
        assert!(!alert.message.is_empty());
    }

    #[test]
    fn accurate_history_raises_no_alert() {
        let tracker = AccuracyTracker::new(90, 0.70, 10);
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap();

        for _ in 0..12 {
            tracker
                .record_outcome(
                    &forecast(date, 22.0, 0.2, WeatherCondition::Sunny),
                    &actual(date, 21.5, 0.0, WeatherCondition::Sunny),
                )
                .unwrap();
        }
        assert!(tracker.check_alert_threshold_at(7, now).is_none());
    }
}
