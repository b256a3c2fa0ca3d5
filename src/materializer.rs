//! Daily materialization: raw events in, queryable snapshots out
//!
//! One unit of work per (sprint, date): fetch the sprint's events through
//! the end of the day, extract the 8 signals, normalize them against the
//! team's rolling baselines, and atomically replace-or-insert the daily
//! snapshot. The computation is deterministic over its inputs, so re-running
//! a unit (scheduler retry, concurrent invocation) rewrites an identical row
//! rather than duplicating or drifting.

use crate::baseline::BaselineCache;
use crate::error::Result;
use crate::events::sprint_summary;
use crate::extract::{extract, ExtractionContext};
use crate::storage::StorageBackend;
use crate::types::{
    DailySnapshot, SignalName, SprintId, SprintSummary, TeamId, SCHEMA_VERSION,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// How many completed sprints feed `velocity_trend`
const PRIOR_SPRINT_WINDOW: usize = 3;

/// Outcome of one scheduled pass over the active sprints
#[derive(Debug, Clone, Default)]
pub struct MaterializationReport {
    pub committed: Vec<SprintId>,
    pub failed: Vec<FailedSprint>,
}

/// A sprint whose materialization failed this pass; retried on the next one
#[derive(Debug, Clone)]
pub struct FailedSprint {
    pub sprint_id: SprintId,
    pub error: String,
}

/// The scheduled/incremental job that writes daily snapshots
pub struct Materializer {
    storage: Arc<dyn StorageBackend>,
    baseline_window_days: i64,
    baseline_min_samples: usize,
}

impl Materializer {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        baseline_window_days: i64,
        baseline_min_samples: usize,
    ) -> Self {
        Self {
            storage,
            baseline_window_days,
            baseline_min_samples,
        }
    }

    /// Materialize the snapshot for one sprint covering one UTC day.
    ///
    /// Idempotent: unchanged inputs produce a byte-identical row, and the
    /// baseline window replaces rather than re-counts this (sprint, date)
    /// observation. A failure anywhere before the snapshot upsert leaves the
    /// previously committed row intact.
    pub async fn materialize(&self, sprint_id: &SprintId, date: NaiveDate) -> Result<DailySnapshot> {
        let sprint = self.storage.get_sprint(sprint_id).await?;

        // Events through the end of the covered day
        let as_of = end_of_day(date);
        let mut events = self
            .storage
            .events_since(sprint_id, DateTime::UNIX_EPOCH)
            .await?;
        events.retain(|e| e.received_at < as_of);

        let mut tags = self.storage.retrospective_tags(sprint_id).await?;
        tags.retain(|t| t.created_at < as_of);
        let prior_sprints = self.prior_summaries(&sprint.team_id, date).await?;

        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &tags,
            prior_sprints: &prior_sprints,
            as_of,
        };
        let signals = extract(&ctx);

        // Normalize against history, then fold today's values in; the
        // current value never normalizes against itself.
        let mut cache = BaselineCache::new(self.baseline_window_days, self.baseline_min_samples);
        for signal in signals.values.keys() {
            if let Some(baseline) = self.storage.load_baseline(&sprint.team_id, *signal).await? {
                cache.seed(sprint.team_id.clone(), *signal, baseline);
            }
        }

        let mut normalized = BTreeMap::new();
        let mut low_confidence = BTreeSet::new();
        for (signal, value) in &signals.values {
            let result = cache.normalize(&sprint.team_id, *signal, *value);
            normalized.insert(*signal, result.z);
            if result.low_confidence {
                low_confidence.insert(*signal);
            }
        }

        let snapshot = DailySnapshot {
            schema_version: SCHEMA_VERSION,
            sprint_id: sprint_id.clone(),
            date,
            signals: signals.clone(),
            normalized,
            low_confidence,
        };
        self.storage.upsert_snapshot(&snapshot).await?;

        for (signal, value) in &signals.values {
            let updated = cache.observe(&sprint.team_id, *signal, sprint_id, date, *value);
            self.storage
                .store_baseline(&sprint.team_id, *signal, updated)
                .await?;
        }

        info!(
            "Materialized {} for {}: {}/{} signals, quality {:.3}",
            sprint_id,
            date,
            snapshot.signals.values.len(),
            SignalName::COUNT,
            snapshot.data_quality()
        );
        Ok(snapshot)
    }

    /// Run the daily unit of work for every sprint in progress on `date`.
    ///
    /// Each sprint is an independent unit: a failure is logged and reported,
    /// never allowed to abort its siblings, and the failed sprint is picked
    /// up again on the next scheduled pass.
    pub async fn materialize_active(&self, date: NaiveDate) -> Result<MaterializationReport> {
        let sprints = self.storage.active_sprints(date).await?;
        let mut report = MaterializationReport::default();

        for sprint in sprints {
            match self.materialize(&sprint.sprint_id, date).await {
                Ok(_) => report.committed.push(sprint.sprint_id),
                Err(err) => {
                    warn!(
                        "Materialization failed for {} on {}: {}",
                        sprint.sprint_id, date, err
                    );
                    report.failed.push(FailedSprint {
                        sprint_id: sprint.sprint_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Materialization pass for {}: {} committed, {} failed",
            date,
            report.committed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Summaries of the team's most recent completed sprints, oldest first,
    /// each derived by replaying that sprint's own event log
    async fn prior_summaries(
        &self,
        team_id: &TeamId,
        before: NaiveDate,
    ) -> Result<Vec<SprintSummary>> {
        let mut completed = self
            .storage
            .completed_sprints_before(team_id, before, PRIOR_SPRINT_WINDOW)
            .await?;
        completed.reverse();

        let mut summaries = Vec::with_capacity(completed.len());
        for sprint in &completed {
            let events = self
                .storage
                .events_since(&sprint.sprint_id, DateTime::UNIX_EPOCH)
                .await?;
            summaries.push(sprint_summary(sprint, &events));
        }
        Ok(summaries)
    }
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    (date + chrono::Duration::days(1))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteStorage;
    use crate::storage::test_utils;
    use crate::types::SprintState;

    async fn seeded_storage() -> Arc<SqliteStorage> {
        let storage = Arc::new(SqliteStorage::in_memory().unwrap());
        for sprint in test_utils::sample_sprint_history() {
            storage.upsert_sprint(&sprint).await.unwrap();
            if sprint.state == SprintState::Completed {
                // 4 closed 5-point issues per completed sprint
                for event in test_utils::completed_sprint_events(&sprint, 4, 5.0, 1.0) {
                    storage.insert_event(&event).await.unwrap();
                }
            }
        }
        // Active sprint telemetry
        let history = test_utils::sample_sprint_history();
        let active = &history[3];
        for event in test_utils::completed_sprint_events(active, 2, 5.0, 0.5) {
            storage.insert_event(&event).await.unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn test_materialize_writes_snapshot_with_signals() {
        let storage = seeded_storage().await;
        let materializer = Materializer::new(storage.clone(), 90, 3);
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let sprint_id = SprintId::new("SPR-4");

        let snapshot = materializer.materialize(&sprint_id, date).await.unwrap();

        assert!(snapshot.signals.get(SignalName::BurndownSlope).is_some());
        assert!(snapshot.signals.get(SignalName::VelocityTrend).is_some());
        assert!(snapshot.signals.get(SignalName::EstimateVariance).is_some());
        // Every computed signal got a z-score
        assert_eq!(
            snapshot.normalized.len(),
            snapshot.signals.values.len()
        );

        let stored = storage.get_snapshot(&sprint_id, date).await.unwrap().unwrap();
        assert_eq!(stored, snapshot);
    }

    #[tokio::test]
    async fn test_materialize_twice_is_byte_identical_and_baseline_stable() {
        let storage = seeded_storage().await;
        let materializer = Materializer::new(storage.clone(), 90, 3);
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        let sprint_id = SprintId::new("SPR-4");

        let first = materializer.materialize(&sprint_id, date).await.unwrap();
        let second = materializer.materialize(&sprint_id, date).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );

        // Re-running replaced, not re-counted, the day's observation
        let team = TeamId::new("team-a");
        let baseline = storage
            .load_baseline(&team, SignalName::BurndownSlope)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(baseline.len(), 1);
    }

    #[tokio::test]
    async fn test_events_after_cutoff_are_excluded() {
        let storage = seeded_storage().await;
        let materializer = Materializer::new(storage.clone(), 90, 3);
        let sprint_id = SprintId::new("SPR-4");

        // Day 1 of the sprint: the mid-sprint done/effort events (day 5)
        // have not happened yet
        let early = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let snapshot = materializer.materialize(&sprint_id, early).await.unwrap();

        // Nothing resolved yet: burndown is maximally behind the ideal pace
        let slope = snapshot.signals.get(SignalName::BurndownSlope).unwrap();
        assert!(slope < 0.0);
        assert_eq!(snapshot.signals.get(SignalName::BlockerDensity), Some(0.0));
    }

    #[tokio::test]
    async fn test_materialize_active_covers_in_progress_sprints() {
        let storage = seeded_storage().await;
        let materializer = Materializer::new(storage.clone(), 90, 3);
        let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();

        let report = materializer.materialize_active(date).await.unwrap();
        assert_eq!(report.committed, vec![SprintId::new("SPR-4")]);
        assert!(report.failed.is_empty());
    }
}
