//! Error handling for the Weather Prediction Engine
//!
//! Nothing here is fatal to the process: every variant maps to a degraded
//! mode (climatology fallback, kept snapshot, skipped cycle) that the caller
//! logs and survives.

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Too few observations to extract features; callers fall back to the
    /// climatology baseline with capped confidence
    #[error("Insufficient data: {available} observations available, {required} required")]
    InsufficientData { required: usize, available: usize },

    /// Model fit failed; the previously active snapshot stays in service
    #[error("Model training failed: {0}")]
    ModelTraining(String),

    /// Propagated to the caller, never retried internally
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// The historical store could not serve the request; the current cycle
    /// is skipped rather than retried
    #[error("History store error: {0}")]
    History(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for engine operations
pub type AppResult<T> = Result<T, AppError>;
