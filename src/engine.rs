//! Orchestrating facade over storage, materialization, scoring, and audit
//!
//! External collaborators (API layer, scheduler, dashboard) talk to one
//! [`PulseEngine`] instead of wiring the services individually. The facade
//! adds no semantics of its own: every flow delegates to the owning service.

use crate::audit::{AuditRecorder, CalibrationBucket};
use crate::config::PulseConfig;
use crate::error::{PulseError, Result};
use crate::ingest::{IngestReceipt, IngestService};
use crate::materializer::{MaterializationReport, Materializer};
use crate::predict::PredictionEngine;
use crate::storage::StorageBackend;
use crate::types::{
    CalibrationFilter, DailySnapshot, PredictionId, PredictionRecord, RawEvent, RetrospectiveTag,
    SprintId, SprintOutcome, WeightVector,
};
use chrono::NaiveDate;
use std::sync::Arc;

/// The assembled SprintPulse core
pub struct PulseEngine {
    storage: Arc<dyn StorageBackend>,
    ingest: IngestService,
    materializer: Materializer,
    predictor: PredictionEngine,
    recorder: AuditRecorder,
}

impl PulseEngine {
    /// Wire the services over an injected storage backend.
    ///
    /// Fails if the configured model version names no registered strategy.
    pub fn new(config: &PulseConfig, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let predictor = PredictionEngine::with_version(&config.model_version)?;
        Ok(Self {
            ingest: IngestService::new(storage.clone()),
            materializer: Materializer::new(
                storage.clone(),
                config.baseline.window_days,
                config.baseline.min_samples,
            ),
            predictor,
            recorder: AuditRecorder::new(storage.clone()),
            storage,
        })
    }

    /// Ingest one raw event (dedup handled at the storage boundary)
    pub async fn ingest(&self, event: RawEvent) -> Result<IngestReceipt> {
        self.ingest.ingest(event).await
    }

    pub async fn ingest_batch(&self, events: Vec<RawEvent>) -> Result<Vec<IngestReceipt>> {
        self.ingest.ingest_batch(events).await
    }

    pub async fn record_retrospective(&self, tag: RetrospectiveTag) -> Result<()> {
        self.ingest.record_retrospective(tag).await
    }

    /// The scheduler's daily entry point
    pub async fn materialize_active(&self, date: NaiveDate) -> Result<MaterializationReport> {
        self.materializer.materialize_active(date).await
    }

    /// Materialize one sprint for one day (idempotent unit of work)
    pub async fn materialize(&self, sprint_id: &SprintId, date: NaiveDate) -> Result<DailySnapshot> {
        self.materializer.materialize(sprint_id, date).await
    }

    /// Score a sprint's materialized snapshot with the team's weights and
    /// persist the prediction to the audit trail.
    ///
    /// Teams without a stored weight vector score against the documented
    /// defaults.
    pub async fn predict_sprint(
        &self,
        sprint_id: &SprintId,
        date: NaiveDate,
    ) -> Result<PredictionRecord> {
        let snapshot = self
            .storage
            .get_snapshot(sprint_id, date)
            .await?
            .ok_or_else(|| PulseError::SnapshotNotFound {
                sprint_id: sprint_id.to_string(),
                date: date.to_string(),
            })?;

        let sprint = self.storage.get_sprint(sprint_id).await?;
        let weights = match self.storage.get_weights(&sprint.team_id).await? {
            Some(weights) => weights,
            None => WeightVector::defaults(sprint.team_id.clone()),
        };

        let prediction = self.predictor.predict(&snapshot, &weights);
        let id = self.recorder.record(&snapshot, &prediction).await?;
        self.storage.get_prediction(&id).await
    }

    pub async fn backfill_outcome(
        &self,
        prediction_id: &PredictionId,
        outcome: SprintOutcome,
    ) -> Result<()> {
        self.recorder.backfill_outcome(prediction_id, outcome).await
    }

    pub async fn calibration_report(
        &self,
        filter: &CalibrationFilter,
    ) -> Result<Vec<CalibrationBucket>> {
        self.recorder.calibration_report(filter).await
    }
}
