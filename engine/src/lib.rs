//! Weather Prediction Engine
//!
//! Ingests historical meteorological observations and produces multi-day
//! forecasts with calibrated confidence scores, derives typed safety
//! warnings, and continuously tracks its own prediction accuracy. Data
//! collection, persistence and the API surface are external collaborators
//! behind the boundaries in `external`.

pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod services;

pub use config::Config;
pub use engine::ForecastEngine;
pub use error::{AppError, AppResult};
