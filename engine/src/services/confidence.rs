//! Forecast confidence estimation
//!
//! Confidence starts from the snapshot's residual spread, decays with the
//! forecast horizon (non-increasing by construction) and is further
//! discounted by recently measured accuracy and by stale input windows.

use crate::services::model::ModelState;

/// Day-1 confidence of a freshly trained, well-behaved model
const BASE_CONFIDENCE: f64 = 0.85;

/// Confidence lost per day of forecast horizon
const HORIZON_DECAY: f64 = 0.05;

/// Residual spread (°C) at which the residual discount saturates
const RESIDUAL_SCALE: f64 = 5.0;

/// Largest discount the residual spread can apply
const MAX_RESIDUAL_DISCOUNT: f64 = 0.10;

/// Multiplier applied when the observation window is stale
const STALE_DISCOUNT: f64 = 0.9;

/// Ceiling for climatology-baseline forecasts; always below 0.5
const BASELINE_CEILING: f64 = 0.45;

/// Derives per-day confidence scores for a generation batch
#[derive(Debug, Clone)]
pub struct ConfidenceEstimator {
    low_threshold: f64,
}

impl ConfidenceEstimator {
    pub fn new(low_threshold: f64) -> Self {
        Self { low_threshold }
    }

    /// Confidence for day `day_offset` (0-based) of a model-backed batch
    ///
    /// `recent_accuracy` is the tracker's trailing overall accuracy for the
    /// location, when enough outcomes exist to report one.
    pub fn calculate(
        &self,
        day_offset: usize,
        state: &ModelState,
        recent_accuracy: Option<f64>,
        stale: bool,
    ) -> f64 {
        let residual_discount =
            (state.residual_std.temp_high / RESIDUAL_SCALE * MAX_RESIDUAL_DISCOUNT)
                .min(MAX_RESIDUAL_DISCOUNT);
        let base = BASE_CONFIDENCE - residual_discount;

        let horizon = (base - HORIZON_DECAY * day_offset as f64).max(0.0);

        let accuracy_factor = match recent_accuracy {
            Some(acc) => 0.7 + 0.3 * acc.clamp(0.0, 1.0),
            None => 1.0,
        };
        let stale_factor = if stale { STALE_DISCOUNT } else { 1.0 };

        (horizon * accuracy_factor * stale_factor).clamp(0.0, 1.0)
    }

    /// Confidence for day `day_offset` of a climatology-baseline batch
    ///
    /// Capped below 0.5: a baseline answer must always read as low
    /// confidence downstream.
    pub fn baseline(&self, day_offset: usize) -> f64 {
        (BASELINE_CEILING - 0.02 * day_offset as f64).max(0.2)
    }

    /// Whether a score must carry the low-confidence flag
    pub fn is_low(&self, confidence: f64) -> bool {
        confidence < self.low_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::features::Normalization;
    use crate::services::model::{
        Climatology, ConditionScorer, ForestParams, ForestRegressor, ModelState, ResidualStd,
        Trainable,
    };
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot(residual: f64) -> ModelState {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let params = ForestParams {
            n_trees: 5,
            ..ForestParams::default()
        };
        let forest = ForestRegressor::fit(&rows, &targets, &params, &mut rng).unwrap();

        ModelState {
            version: 1,
            trained_at: Utc::now(),
            training_cutoff: Utc::now(),
            training_samples: 20,
            normalization: Normalization {
                means: vec![0.0],
                stds: vec![1.0],
            },
            temp_high: forest.clone(),
            temp_low: forest.clone(),
            precipitation: forest,
            conditions: ConditionScorer::fit(&[]),
            residual_std: ResidualStd {
                temp_high: residual,
                temp_low: residual,
                precipitation: residual,
            },
            climatology: Climatology::fit(&[]),
        }
    }

    #[test]
    fn confidence_is_non_increasing_in_horizon() {
        let estimator = ConfidenceEstimator::new(0.70);
        let state = snapshot(1.0);

        let scores: Vec<f64> = (0..14)
            .map(|d| estimator.calculate(d, &state, Some(0.8), false))
            .collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1], "confidence increased: {pair:?}");
        }
    }

    #[test]
    fn discounts_reduce_confidence() {
        let estimator = ConfidenceEstimator::new(0.70);
        let state = snapshot(1.0);

        let clean = estimator.calculate(0, &state, None, false);
        let stale = estimator.calculate(0, &state, None, true);
        let degraded = estimator.calculate(0, &state, Some(0.2), false);

        assert!(stale < clean);
        assert!(degraded < clean);
    }

    #[test]
    fn wide_residuals_cost_confidence() {
        let estimator = ConfidenceEstimator::new(0.70);
        let tight = estimator.calculate(0, &snapshot(0.5), None, false);
        let wide = estimator.calculate(0, &snapshot(20.0), None, false);
        assert!(wide < tight);
    }

    #[test]
    fn baseline_stays_below_half() {
        let estimator = ConfidenceEstimator::new(0.70);
        for day in 0..14 {
            assert!(estimator.baseline(day) < 0.5);
        }
    }

    #[test]
    fn low_flag_matches_threshold_boundary() {
        let estimator = ConfidenceEstimator::new(0.70);
        assert!(!estimator.is_low(0.70));
        assert!(estimator.is_low(0.699));
        assert!(!estimator.is_low(0.9));
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let estimator = ConfidenceEstimator::new(0.70);
        let state = snapshot(100.0);
        for day in 0..20 {
            let c = estimator.calculate(day, &state, Some(0.0), true);
            assert!((0.0..=1.0).contains(&c));
        }
    }
}
