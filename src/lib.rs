//! SprintPulse - Sprint Risk Telemetry Engine
//!
//! Converts a stream of raw project-tracking issue events into a daily
//! per-sprint risk signal and an explainable risk score:
//! - Exactly-once accounting of noisy, out-of-order, retried events
//! - 8 sprint-health signals over sliding historical windows
//! - Daily materialization into queryable snapshots
//! - Transparent weighted scoring with a versioned rescaling formula
//! - A full audit trail with outcome backfill and calibration reporting
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (RawEvent, SignalSet, DailySnapshot, ...)
//! - **Storage**: Database backend behind the [`storage::StorageBackend`] trait
//! - **Services**: Ingestion, extraction, normalization, materialization,
//!   prediction, audit
//! - **Engine**: The [`engine::PulseEngine`] facade consumed by the external
//!   API layer, scheduler, and dashboard
//!
//! # Example
//!
//! ```ignore
//! use sprintpulse::{PulseConfig, PulseEngine, SqliteStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PulseConfig::load(None)?;
//!     let storage = Arc::new(SqliteStorage::open(&config.database_path)?);
//!     let engine = PulseEngine::new(&config, storage)?;
//!
//!     // Scheduler tick: materialize every in-progress sprint for today
//!     let today = chrono::Utc::now().date_naive();
//!     let report = engine.materialize_active(today).await?;
//!
//!     // Score a sprint and persist the audit record
//!     for sprint_id in &report.committed {
//!         let record = engine.predict_sprint(sprint_id, today).await?;
//!         println!("{}: risk {:.2}", sprint_id, record.predicted_risk);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod baseline;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extract;
pub mod ingest;
pub mod materializer;
pub mod predict;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use audit::{AuditRecorder, CalibrationBucket};
pub use baseline::{BaselineCache, Normalized, RollingBaseline};
pub use self::config::{BaselineConfig, PulseConfig};
pub use engine::PulseEngine;
pub use error::{PulseError, Result};
pub use events::{EventPayload, IssueStatus};
pub use extract::{extract, ExtractionContext};
pub use ingest::{IngestReceipt, IngestRejection, IngestService};
pub use materializer::{MaterializationReport, Materializer};
pub use predict::{Prediction, PredictionEngine, RiskModel};
pub use storage::{sqlite::SqliteStorage, StorageBackend};
pub use types::{
    CalibrationFilter, DailySnapshot, IssueKey, PredictionId, PredictionRecord, RawEvent,
    RetrospectiveTag, SignalName, SignalSet, SprintId, SprintOutcome, SprintRecord, SprintState,
    SprintSummary, TeamId, WeightVector, SCHEMA_VERSION,
};
