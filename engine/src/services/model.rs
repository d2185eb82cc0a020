//! Ensemble regression model and trained snapshots
//!
//! The forecasting capability sits behind the `Trainable`/`Predictable`
//! traits; the default implementation is a seeded random-forest-style
//! ensemble of depth-limited regression trees. A trained `ModelState` is an
//! immutable, versioned snapshot: once published it is never mutated, only
//! replaced.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use shared::{Observation, WeatherCondition};

use crate::error::{AppError, AppResult};
use crate::services::features::{mean, variance, FeatureExtractor, FeatureVector, Normalization};

/// Below this many day-samples a fit is refused rather than overfitted
pub const MIN_TRAINING_SAMPLES: usize = 10;

/// A fitted single-target regressor
pub trait Predictable: Send + Sync {
    fn predict(&self, features: &[f64]) -> f64;
}

/// A regressor that can be fitted from a feature matrix
pub trait Trainable: Sized {
    fn fit(rows: &[Vec<f64>], targets: &[f64], params: &ForestParams, rng: &mut StdRng)
        -> AppResult<Self>;
}

/// Hyperparameters for the tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 15,
            min_samples_split: 5,
            min_samples_leaf: 2,
        }
    }
}

/// One node of a regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn fit(rows: &[Vec<f64>], targets: &[f64], indices: &[usize], depth: usize, params: &ForestParams) -> TreeNode {
        let subset: Vec<f64> = indices.iter().map(|&i| targets[i]).collect();
        let leaf_value = mean(&subset);

        if depth >= params.max_depth
            || indices.len() < params.min_samples_split
            || variance(&subset) < 1e-12
        {
            return TreeNode::Leaf { value: leaf_value };
        }

        let Some((feature, threshold)) = best_split(rows, targets, indices, params) else {
            return TreeNode::Leaf { value: leaf_value };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| rows[i][feature] < threshold);

        if left_idx.len() < params.min_samples_leaf || right_idx.len() < params.min_samples_leaf {
            return TreeNode::Leaf { value: leaf_value };
        }

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(TreeNode::fit(rows, targets, &left_idx, depth + 1, params)),
            right: Box::new(TreeNode::fit(rows, targets, &right_idx, depth + 1, params)),
        }
    }

    fn predict(&self, features: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if features.get(*feature).copied().unwrap_or(0.0) < *threshold {
                    left.predict(features)
                } else {
                    right.predict(features)
                }
            }
        }
    }
}

/// The (feature, threshold) pair with the largest weighted variance reduction
fn best_split(
    rows: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    params: &ForestParams,
) -> Option<(usize, f64)> {
    let n_features = rows.first().map(Vec::len).unwrap_or(0);
    let parent: Vec<f64> = indices.iter().map(|&i| targets[i]).collect();
    let parent_score = variance(&parent) * parent.len() as f64;

    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..n_features {
        let mut values: Vec<f64> = indices.iter().map(|&i| rows[i][feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        // Cap the candidate count so wide value ranges stay cheap to scan
        let stride = (values.len() / 32).max(1);

        for pair in values.windows(2).step_by(stride) {
            let threshold = (pair[0] + pair[1]) / 2.0;
            let mut left = Vec::new();
            let mut right = Vec::new();
            for &i in indices {
                if rows[i][feature] < threshold {
                    left.push(targets[i]);
                } else {
                    right.push(targets[i]);
                }
            }

            if left.len() < params.min_samples_leaf || right.len() < params.min_samples_leaf {
                continue;
            }

            let score = variance(&left) * left.len() as f64 + variance(&right) * right.len() as f64;
            let gain = parent_score - score;
            if gain > 1e-12 && best.map(|(_, _, g)| gain > g).unwrap_or(true) {
                best = Some((feature, threshold, gain));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestRegressor {
    trees: Vec<TreeNode>,
}

impl Trainable for ForestRegressor {
    fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> AppResult<Self> {
        if rows.len() != targets.len() || rows.is_empty() {
            return Err(AppError::ModelTraining(format!(
                "feature/target mismatch: {} rows, {} targets",
                rows.len(),
                targets.len()
            )));
        }

        let n = rows.len();
        let trees = (0..params.n_trees)
            .map(|_| {
                // Bootstrap sample with replacement; seeded, so reproducible
                let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                TreeNode::fit(rows, targets, &indices, 0, params)
            })
            .collect();

        Ok(Self { trees })
    }
}

impl Predictable for ForestRegressor {
    fn predict(&self, features: &[f64]) -> f64 {
        self.predict_with_spread(features).0
    }
}

impl ForestRegressor {
    /// Ensemble mean and the standard deviation across member trees
    pub fn predict_with_spread(&self, features: &[f64]) -> (f64, f64) {
        if self.trees.is_empty() {
            return (0.0, 0.0);
        }
        let votes: Vec<f64> = self.trees.iter().map(|t| t.predict(features)).collect();
        (mean(&votes), variance(&votes).sqrt())
    }
}

/// Gaussian class scorer for the condition label
///
/// Scores each condition class by prior + likelihood of the predicted
/// temperature/precipitation pair; the label is the arg-max of the scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionScorer {
    classes: Vec<WeatherCondition>,
    priors: Vec<f64>,
    means: Vec<[f64; 2]>,
    variances: Vec<[f64; 2]>,
}

impl ConditionScorer {
    pub fn fit(samples: &[(f64, f64, WeatherCondition)]) -> Self {
        let mut grouped: HashMap<WeatherCondition, Vec<[f64; 2]>> = HashMap::new();
        for &(high, precip, condition) in samples {
            grouped.entry(condition).or_default().push([high, precip]);
        }

        let mut classes: Vec<WeatherCondition> = grouped.keys().copied().collect();
        // HashMap order is not stable; fix the class order for determinism
        classes.sort_by_key(|c| c.label());

        let total = samples.len() as f64;
        let mut priors = Vec::with_capacity(classes.len());
        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());

        for class in &classes {
            let rows = &grouped[class];
            priors.push(rows.len() as f64 / total.max(1.0));
            let highs: Vec<f64> = rows.iter().map(|r| r[0]).collect();
            let precips: Vec<f64> = rows.iter().map(|r| r[1]).collect();
            means.push([mean(&highs), mean(&precips)]);
            variances.push([
                variance(&highs).max(1e-3),
                variance(&precips).max(1e-3),
            ]);
        }

        Self {
            classes,
            priors,
            means,
            variances,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Log-score per class for a (temp high, precipitation mm) pair
    pub fn scores(&self, temp_high: f64, precipitation_mm: f64) -> Vec<f64> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let prior = self.priors[i].max(1e-9).ln();
                let point = [temp_high, precipitation_mm];
                let likelihood: f64 = (0..2)
                    .map(|d| {
                        let var = self.variances[i][d];
                        let diff = point[d] - self.means[i][d];
                        -0.5 * (diff * diff / var + var.ln())
                    })
                    .sum();
                prior + likelihood
            })
            .collect()
    }

    /// Arg-max class for the pair; None when the scorer has no classes
    pub fn predict(&self, temp_high: f64, precipitation_mm: f64) -> Option<WeatherCondition> {
        let scores = self.scores(temp_high, precipitation_mm);
        scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| self.classes[i])
    }
}

/// Rule-of-thumb condition label used when no scorer is available
pub fn fallback_condition(temp_high: f64, precipitation_mm: f64) -> WeatherCondition {
    if precipitation_mm > 5.0 {
        if temp_high < 0.0 {
            WeatherCondition::Snow
        } else {
            WeatherCondition::Rainy
        }
    } else if precipitation_mm > 1.0 {
        WeatherCondition::Drizzle
    } else if temp_high > 30.0 {
        WeatherCondition::Sunny
    } else if temp_high > 20.0 {
        WeatherCondition::PartlyCloudy
    } else {
        WeatherCondition::Cloudy
    }
}

/// Per-month daily aggregates, the seasonal baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Climatology {
    months: Vec<MonthStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonthStats {
    pub temp_high_mean: f64,
    pub temp_low_mean: f64,
    pub rain_probability: f64,
    pub precipitation_mean: f64,
    pub wind_kmh_mean: f64,
    pub samples: usize,
}

impl Climatology {
    pub fn fit(observations: &[Observation]) -> Self {
        let mut days: HashMap<chrono::NaiveDate, DayAggregate> = HashMap::new();
        for obs in observations {
            let agg = days.entry(obs.timestamp.date_naive()).or_default();
            agg.high = agg.high.max(obs.temperature);
            agg.low = agg.low.min(obs.temperature);
            agg.precipitation += obs.precipitation;
            agg.wind_kmh = agg.wind_kmh.max(obs.wind_speed * 3.6);
        }

        let mut months = vec![MonthStats::default(); 12];
        let mut counts = vec![0usize; 12];
        let mut ordered: Vec<(&chrono::NaiveDate, &DayAggregate)> = days.iter().collect();
        ordered.sort_by_key(|(date, _)| **date);
        for (date, agg) in ordered {
            let m = date.month0() as usize;
            counts[m] += 1;
            months[m].temp_high_mean += agg.high;
            months[m].temp_low_mean += agg.low;
            months[m].precipitation_mean += agg.precipitation;
            months[m].wind_kmh_mean += agg.wind_kmh;
            if agg.precipitation > 0.0 {
                months[m].rain_probability += 1.0;
            }
        }
        for (m, stats) in months.iter_mut().enumerate() {
            let n = counts[m].max(1) as f64;
            stats.temp_high_mean /= n;
            stats.temp_low_mean /= n;
            stats.precipitation_mean /= n;
            stats.wind_kmh_mean /= n;
            stats.rain_probability /= n;
            stats.samples = counts[m];
        }

        Self { months }
    }

    /// Stats for a month (1-12); empty months fall back to the overall mean
    pub fn month(&self, month: u32) -> MonthStats {
        let idx = (month.clamp(1, 12) - 1) as usize;
        if self.months[idx].samples > 0 {
            return self.months[idx].clone();
        }
        // Average over the populated months
        let populated: Vec<&MonthStats> = self.months.iter().filter(|m| m.samples > 0).collect();
        if populated.is_empty() {
            return MonthStats {
                temp_high_mean: 15.0,
                temp_low_mean: 8.0,
                rain_probability: 0.3,
                precipitation_mean: 1.0,
                wind_kmh_mean: 15.0,
                samples: 0,
            };
        }
        let n = populated.len() as f64;
        MonthStats {
            temp_high_mean: populated.iter().map(|m| m.temp_high_mean).sum::<f64>() / n,
            temp_low_mean: populated.iter().map(|m| m.temp_low_mean).sum::<f64>() / n,
            rain_probability: populated.iter().map(|m| m.rain_probability).sum::<f64>() / n,
            precipitation_mean: populated.iter().map(|m| m.precipitation_mean).sum::<f64>() / n,
            wind_kmh_mean: populated.iter().map(|m| m.wind_kmh_mean).sum::<f64>() / n,
            samples: 0,
        }
    }
}

#[derive(Debug)]
struct DayAggregate {
    high: f64,
    low: f64,
    precipitation: f64,
    wind_kmh: f64,
}

impl Default for DayAggregate {
    fn default() -> Self {
        Self {
            high: f64::NEG_INFINITY,
            low: f64::INFINITY,
            precipitation: 0.0,
            wind_kmh: 0.0,
        }
    }
}

/// In-sample residual spread per target, feeds confidence estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualStd {
    pub temp_high: f64,
    pub temp_low: f64,
    pub precipitation: f64,
}

/// Immutable, versioned snapshot of a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub training_cutoff: DateTime<Utc>,
    pub training_samples: usize,
    pub normalization: Normalization,
    pub temp_high: ForestRegressor,
    pub temp_low: ForestRegressor,
    pub precipitation: ForestRegressor,
    pub conditions: ConditionScorer,
    pub residual_std: ResidualStd,
    pub climatology: Climatology,
}

/// Options controlling a training run
#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub seed: u64,
    pub forest: ForestParams,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            forest: ForestParams::default(),
        }
    }
}

/// One supervised day-sample assembled from the observation history
struct TrainingSample {
    features: FeatureVector,
    target_high: f64,
    target_low: f64,
    target_precipitation: f64,
    target_condition: WeatherCondition,
}

/// Fit a new model snapshot over the observation history
///
/// Deterministic for a fixed seed and input ordering. CPU-heavy; callers run
/// it on a blocking worker, never inline with a predict request.
pub fn train_model(
    observations: &[Observation],
    extractor: &FeatureExtractor,
    version: u64,
    options: &TrainingOptions,
) -> AppResult<ModelState> {
    let samples = build_training_samples(observations, extractor);
    if samples.len() < MIN_TRAINING_SAMPLES {
        return Err(AppError::ModelTraining(format!(
            "insufficient training samples: {} available, {} required",
            samples.len(),
            MIN_TRAINING_SAMPLES
        )));
    }

    let raw_rows: Vec<FeatureVector> = samples.iter().map(|s| s.features.clone()).collect();
    let normalization = Normalization::fit(&raw_rows);
    let rows: Vec<Vec<f64>> = raw_rows.iter().map(|r| normalization.apply(r)).collect();

    let highs: Vec<f64> = samples.iter().map(|s| s.target_high).collect();
    let lows: Vec<f64> = samples.iter().map(|s| s.target_low).collect();
    let precips: Vec<f64> = samples.iter().map(|s| s.target_precipitation).collect();

    let mut rng = StdRng::seed_from_u64(options.seed);
    let temp_high = ForestRegressor::fit(&rows, &highs, &options.forest, &mut rng)?;
    let temp_low = ForestRegressor::fit(&rows, &lows, &options.forest, &mut rng)?;
    let precipitation = ForestRegressor::fit(&rows, &precips, &options.forest, &mut rng)?;

    let conditions = ConditionScorer::fit(
        &samples
            .iter()
            .map(|s| (s.target_high, s.target_precipitation, s.target_condition))
            .collect::<Vec<_>>(),
    );

    let residual_std = ResidualStd {
        temp_high: residual_spread(&temp_high, &rows, &highs),
        temp_low: residual_spread(&temp_low, &rows, &lows),
        precipitation: residual_spread(&precipitation, &rows, &precips),
    };

    let training_cutoff = observations
        .iter()
        .map(|o| o.timestamp)
        .max()
        .unwrap_or_else(Utc::now);

    tracing::info!(
        version,
        samples = samples.len(),
        residual_temp_high = residual_std.temp_high,
        "model training completed"
    );

    Ok(ModelState {
        version,
        trained_at: Utc::now(),
        training_cutoff,
        training_samples: samples.len(),
        normalization,
        temp_high,
        temp_low,
        precipitation,
        conditions,
        residual_std,
        climatology: Climatology::fit(observations),
    })
}

fn residual_spread(model: &ForestRegressor, rows: &[Vec<f64>], targets: &[f64]) -> f64 {
    let residuals: Vec<f64> = rows
        .iter()
        .zip(targets)
        .map(|(row, target)| model.predict(row) - target)
        .collect();
    variance(&residuals).sqrt()
}

/// Assemble (features at day d, outcomes of day d+1) pairs
fn build_training_samples(
    observations: &[Observation],
    extractor: &FeatureExtractor,
) -> Vec<TrainingSample> {
    if observations.is_empty() {
        return Vec::new();
    }

    let mut by_day: HashMap<chrono::NaiveDate, Vec<&Observation>> = HashMap::new();
    for obs in observations {
        by_day.entry(obs.timestamp.date_naive()).or_default().push(obs);
    }

    let mut dates: Vec<chrono::NaiveDate> = by_day.keys().copied().collect();
    dates.sort();

    let mut samples = Vec::new();
    for date in &dates {
        let next = *date + Duration::days(1);
        let Some(next_obs) = by_day.get(&next) else {
            continue;
        };

        let Some(as_of) = by_day[date]
            .iter()
            .map(|o| o.timestamp)
            .filter(|t| t.hour() >= 12)
            .min()
            .or_else(|| by_day[date].iter().map(|o| o.timestamp).max())
        else {
            continue;
        };

        let window: Vec<Observation> = observations
            .iter()
            .filter(|o| o.timestamp <= as_of && o.timestamp > as_of - Duration::days(8))
            .cloned()
            .collect();

        // Early days legitimately lack a full window; skip them
        let Ok(extracted) = extractor.extract(&observations[0].location, as_of, &window) else {
            continue;
        };

        let target_high = next_obs
            .iter()
            .map(|o| o.temperature)
            .fold(f64::NEG_INFINITY, f64::max);
        let target_low = next_obs
            .iter()
            .map(|o| o.temperature)
            .fold(f64::INFINITY, f64::min);
        let target_precipitation: f64 = next_obs.iter().map(|o| o.precipitation).sum();
        let target_condition = midday_condition(next_obs);

        samples.push(TrainingSample {
            features: extracted.vector,
            target_high,
            target_low,
            target_precipitation,
            target_condition,
        });
    }

    samples
}

/// The condition closest to midday, the day's representative label
fn midday_condition(day: &[&Observation]) -> WeatherCondition {
    day.iter()
        .min_by_key(|o| (o.timestamp.hour() as i64 - 12).abs())
        .map(|o| o.condition)
        .unwrap_or(WeatherCondition::Cloudy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_rows() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y = 2x + 1 over a small grid, two features (second is noise-free 0)
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, 0.0]).collect();
        let targets: Vec<f64> = (0..40).map(|i| 2.0 * i as f64 + 1.0).collect();
        (rows, targets)
    }

    #[test]
    fn forest_fit_is_deterministic_for_fixed_seed() {
        let (rows, targets) = toy_rows();
        let params = ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        };

        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let forest_a = ForestRegressor::fit(&rows, &targets, &params, &mut rng_a).unwrap();
        let forest_b = ForestRegressor::fit(&rows, &targets, &params, &mut rng_b).unwrap();

        for i in 0..40 {
            let features = vec![i as f64, 0.0];
            assert_eq!(forest_a.predict(&features), forest_b.predict(&features));
        }
    }

    #[test]
    fn forest_learns_monotone_relationship() {
        let (rows, targets) = toy_rows();
        let params = ForestParams {
            n_trees: 20,
            ..ForestParams::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let forest = ForestRegressor::fit(&rows, &targets, &params, &mut rng).unwrap();

        let low = forest.predict(&[5.0, 0.0]);
        let high = forest.predict(&[35.0, 0.0]);
        assert!(high > low, "expected {high} > {low}");
    }

    #[test]
    fn forest_spread_is_zero_for_constant_targets() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let targets = vec![3.5; 20];
        let mut rng = StdRng::seed_from_u64(1);
        let forest =
            ForestRegressor::fit(&rows, &targets, &ForestParams::default(), &mut rng).unwrap();

        let (value, spread) = forest.predict_with_spread(&[10.0]);
        assert!((value - 3.5).abs() < 1e-9);
        assert!(spread < 1e-9);
    }

    #[test]
    fn mismatched_rows_and_targets_are_rejected() {
        let rows = vec![vec![1.0], vec![2.0]];
        let targets = vec![1.0];
        let mut rng = StdRng::seed_from_u64(1);
        let result = ForestRegressor::fit(&rows, &targets, &ForestParams::default(), &mut rng);
        assert!(matches!(result, Err(AppError::ModelTraining(_))));
    }

    #[test]
    fn condition_scorer_separates_obvious_classes() {
        let samples: Vec<(f64, f64, WeatherCondition)> = (0..20)
            .map(|i| (32.0 + (i % 3) as f64, 0.0, WeatherCondition::Sunny))
            .chain((0..20).map(|i| (12.0 + (i % 3) as f64, 9.0, WeatherCondition::Rainy)))
            .collect();
        let scorer = ConditionScorer::fit(&samples);

        assert_eq!(scorer.predict(33.0, 0.0), Some(WeatherCondition::Sunny));
        assert_eq!(scorer.predict(12.0, 8.0), Some(WeatherCondition::Rainy));
    }

    #[test]
    fn fallback_condition_covers_the_original_rules() {
        assert_eq!(fallback_condition(-5.0, 10.0), WeatherCondition::Snow);
        assert_eq!(fallback_condition(15.0, 10.0), WeatherCondition::Rainy);
        assert_eq!(fallback_condition(15.0, 2.0), WeatherCondition::Drizzle);
        assert_eq!(fallback_condition(32.0, 0.0), WeatherCondition::Sunny);
        assert_eq!(fallback_condition(25.0, 0.0), WeatherCondition::PartlyCloudy);
        assert_eq!(fallback_condition(10.0, 0.0), WeatherCondition::Cloudy);
    }
}
