//! Shared types and models for the Weather Prediction System
//!
//! This crate contains the domain types shared between the forecasting
//! engine and the surrounding layers (API, collector, presentation).

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
