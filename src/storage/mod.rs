//! Storage layer for the SprintPulse risk engine
//!
//! Defines the contract the core requires from its storage collaborator:
//! unique-constrained insert-or-ignore for raw events, ordered range scans
//! per sprint, keyed upserts for daily snapshots, and append plus
//! single-field write-once updates for prediction records.

pub mod sqlite;
pub mod test_utils;

use crate::baseline::RollingBaseline;
use crate::error::Result;
use crate::types::{
    CalibrationFilter, DailySnapshot, PredictionId, PredictionRecord, RawEvent, RetrospectiveTag,
    SignalName, SprintId, SprintOutcome, SprintRecord, TeamId, WeightVector,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Storage backend trait defining all required operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert a raw event, ignoring duplicates of (event_id, source).
    ///
    /// Returns `true` if a row was written, `false` if the pair already
    /// existed. The duplicate case is a normal outcome under webhook retries
    /// and overlapping polling windows, never an error.
    async fn insert_event(&self, event: &RawEvent) -> Result<bool>;

    /// Events for a sprint received at or after `since`, ordered by receipt
    /// time. Restartable: re-invoking yields the same (or a grown) sequence.
    async fn events_since(
        &self,
        sprint_id: &SprintId,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>>;

    /// Append a retrospective annotation (append-only table)
    async fn insert_retrospective_tag(&self, tag: &RetrospectiveTag) -> Result<()>;

    /// All retrospective annotations for a sprint
    async fn retrospective_tags(&self, sprint_id: &SprintId) -> Result<Vec<RetrospectiveTag>>;

    /// Create or refresh sprint metadata (seeded by the issue system)
    async fn upsert_sprint(&self, sprint: &SprintRecord) -> Result<()>;

    async fn get_sprint(&self, sprint_id: &SprintId) -> Result<SprintRecord>;

    /// Sprints in progress on the given day
    async fn active_sprints(&self, on: NaiveDate) -> Result<Vec<SprintRecord>>;

    /// A team's completed sprints ending before `before`, most recent first
    async fn completed_sprints_before(
        &self,
        team_id: &TeamId,
        before: NaiveDate,
        limit: usize,
    ) -> Result<Vec<SprintRecord>>;

    /// Replace-or-insert the snapshot for its (sprint_id, date) key
    async fn upsert_snapshot(&self, snapshot: &DailySnapshot) -> Result<()>;

    async fn get_snapshot(
        &self,
        sprint_id: &SprintId,
        date: NaiveDate,
    ) -> Result<Option<DailySnapshot>>;

    /// Rolling baseline for (team, signal), if one has been persisted
    async fn load_baseline(
        &self,
        team_id: &TeamId,
        signal: SignalName,
    ) -> Result<Option<RollingBaseline>>;

    async fn store_baseline(
        &self,
        team_id: &TeamId,
        signal: SignalName,
        baseline: &RollingBaseline,
    ) -> Result<()>;

    /// A team's weight vector; `None` means the caller falls back to defaults
    async fn get_weights(&self, team_id: &TeamId) -> Result<Option<WeightVector>>;

    async fn put_weights(&self, weights: &WeightVector) -> Result<()>;

    /// Append an immutable prediction record
    async fn insert_prediction(&self, record: &PredictionRecord) -> Result<()>;

    async fn get_prediction(&self, id: &PredictionId) -> Result<PredictionRecord>;

    /// Set `actual_outcome` exactly once. Setting the same value again is a
    /// no-op success; a differing value fails with
    /// [`crate::error::PulseError::OutcomeConflict`].
    async fn set_outcome(&self, id: &PredictionId, outcome: SprintOutcome) -> Result<()>;

    /// Prediction records whose outcome has been backfilled, filtered and
    /// ordered by creation time. Restartable by re-invocation.
    async fn closed_predictions(
        &self,
        filter: &CalibrationFilter,
    ) -> Result<Vec<PredictionRecord>>;
}
