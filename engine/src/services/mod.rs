//! Core services of the forecasting engine

pub mod accuracy;
pub mod confidence;
pub mod features;
pub mod model;
pub mod predictor;
pub mod scheduler;
pub mod warnings;

pub use accuracy::{AccuracyCalculator, AccuracyTracker};
pub use confidence::ConfidenceEstimator;
pub use features::FeatureExtractor;
pub use model::{ModelState, TrainingOptions};
pub use predictor::{ForecastService, RetrainOutcome};
pub use scheduler::{PredictionScheduler, SchedulerEvent, SchedulerHandle};
pub use warnings::{SeverityClassifier, WarningGenerator};
