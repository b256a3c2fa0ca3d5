//! Error types for the SprintPulse risk engine
//!
//! This module provides structured error handling using thiserror. Expected
//! conditions in the telemetry path (duplicate deliveries, missing signal
//! inputs, thin baselines) are modeled as values, not errors; only genuine
//! faults surface through [`PulseError`].

use crate::types::{PredictionId, SprintOutcome};
use thiserror::Error;

/// Main error type for SprintPulse operations
#[derive(Error, Debug)]
pub enum PulseError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage collaborator unreachable; eligible for retry on the next
    /// scheduled pass
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Event failed basic validation before reaching the store
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Sprint metadata not found
    #[error("Sprint not found: {0}")]
    SprintNotFound(String),

    /// No materialized snapshot exists for the requested sprint/date
    #[error("Snapshot not found for sprint {sprint_id} on {date}")]
    SnapshotNotFound { sprint_id: String, date: String },

    /// Prediction record not found
    #[error("Prediction not found: {0}")]
    PredictionNotFound(String),

    /// Attempt to overwrite an already-set outcome with a different value.
    /// This is a data-integrity violation in the audit trail and is never
    /// silently resolved.
    #[error(
        "Outcome conflict on prediction {prediction_id}: already recorded as \
         {existing:?}, attempted {attempted:?}"
    )]
    OutcomeConflict {
        prediction_id: PredictionId,
        existing: SprintOutcome,
        attempted: SprintOutcome,
    },

    /// Requested model version has no registered scoring strategy
    #[error("Unknown model version: {0}")]
    UnknownModelVersion(String),

    /// Invalid prediction ID format
    #[error("Invalid prediction ID: {0}")]
    InvalidPredictionId(#[from] uuid::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for SprintPulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// Convert anyhow::Error to PulseError
impl From<anyhow::Error> for PulseError {
    fn from(err: anyhow::Error) -> Self {
        PulseError::Other(err.to_string())
    }
}
