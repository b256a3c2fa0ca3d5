//! Full flow: ingest, materialize, predict, record, backfill, calibrate

use chrono::{NaiveDate, TimeZone, Utc};
use sprintpulse::storage::test_utils;
use sprintpulse::{
    CalibrationFilter, EventPayload, IssueKey, IssueStatus, PulseConfig, PulseEngine, PulseError,
    RetrospectiveTag, SignalName, SprintId, SprintOutcome, SqliteStorage, StorageBackend,
};
use std::sync::Arc;

async fn engine_with_storage() -> (PulseEngine, Arc<SqliteStorage>) {
    test_utils::init_tracing();
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let engine = PulseEngine::new(&PulseConfig::default(), storage.clone()).unwrap();
    for sprint in test_utils::sample_sprint_history() {
        storage.upsert_sprint(&sprint).await.unwrap();
    }
    (engine, storage)
}

/// The worked burndown example: 20 of 30 points closed by end of day 7 of a
/// 10-day sprint. With no baseline history every z-score is neutral, so the
/// lone negative burndown signal must not push risk above 0.5.
#[tokio::test]
async fn slightly_behind_burndown_alone_does_not_raise_risk_past_half() {
    let (engine, _storage) = engine_with_storage().await;
    let sprint_id = SprintId::new("SPR-4");
    let day0 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

    let mut events = Vec::new();
    for i in 0..3 {
        events.push(test_utils::payload_event(
            &format!("add-{i}"),
            "SPR-4",
            &format!("P-{i}"),
            EventPayload::IssueAdded {
                points: Some(10.0),
                occurred_at: day0,
            },
            day0,
        ));
    }
    for i in 0..2 {
        let done_at = Utc.with_ymd_and_hms(2026, 3, 6 + i, 15, 0, 0).unwrap();
        events.push(test_utils::payload_event(
            &format!("done-{i}"),
            "SPR-4",
            &format!("P-{i}"),
            EventPayload::StatusChanged {
                status: IssueStatus::Done,
                occurred_at: done_at,
            },
            done_at,
        ));
    }
    for receipt in engine.ingest_batch(events).await.unwrap() {
        assert!(receipt.accepted);
    }

    // Day 7 of the sprint
    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    let snapshot = engine.materialize(&sprint_id, date).await.unwrap();
    let slope = snapshot.signals.get(SignalName::BurndownSlope).unwrap();
    assert!((slope + 0.142857).abs() < 1e-4);

    let record = engine.predict_sprint(&sprint_id, date).await.unwrap();
    assert!(record.predicted_risk <= 0.5);
    // Fresh team, no history: every normalized signal is flagged
    assert!(!record.signal_snapshot.low_confidence.is_empty());
    assert!(record.predicted_confidence < record.signal_snapshot.data_quality());
}

#[tokio::test]
async fn prediction_record_is_reproducible_and_explainable() {
    let (engine, storage) = engine_with_storage().await;
    let sprint_id = SprintId::new("SPR-4");
    let history = test_utils::sample_sprint_history();

    // Build baseline history day by day, then pile on blocked issues
    for event in test_utils::completed_sprint_events(&history[3], 4, 5.0, 1.0) {
        storage.insert_event(&event).await.unwrap();
    }
    // A short blocked spell mid-history keeps the blocker baseline from
    // degenerating to zero spread
    let churn_block = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
    let churn_clear = Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap();
    for (id, status, at) in [
        ("churn-block", IssueStatus::Blocked, churn_block),
        ("churn-clear", IssueStatus::InProgress, churn_clear),
    ] {
        let event = test_utils::payload_event(
            id,
            "SPR-4",
            "SPR-4-1",
            EventPayload::StatusChanged {
                status,
                occurred_at: at,
            },
            at,
        );
        storage.insert_event(&event).await.unwrap();
    }
    for day in 2..=7 {
        let date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        engine.materialize(&sprint_id, date).await.unwrap();
    }

    let blocked_at = Utc.with_ymd_and_hms(2026, 3, 8, 9, 0, 0).unwrap();
    for i in 0..3 {
        let issue = format!("SPR-4-{i}");
        let event = test_utils::payload_event(
            &format!("block-{i}"),
            "SPR-4",
            &issue,
            EventPayload::StatusChanged {
                status: IssueStatus::Blocked,
                occurred_at: blocked_at,
            },
            blocked_at,
        );
        storage.insert_event(&event).await.unwrap();
    }
    engine
        .record_retrospective(RetrospectiveTag {
            sprint_id: sprint_id.clone(),
            issue_key: IssueKey::new("SPR-4-0"),
            tag: "external_dependency".to_string(),
            severity: 4,
            created_at: blocked_at,
        })
        .await
        .unwrap();

    let date = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
    engine.materialize(&sprint_id, date).await.unwrap();
    let record = engine.predict_sprint(&sprint_id, date).await.unwrap();

    assert!((0.0..=1.0).contains(&record.predicted_risk));
    assert_eq!(record.model_version, "logistic-v1");

    // Contributions normalize to 100% of explained score
    let total: f64 = record.contributions.values().map(|c| c.abs()).sum();
    assert!((total - 1.0).abs() < 1e-9);

    // The blocker spike against a quiet baseline is the top contributor
    let (top_signal, top_share) = record
        .contributions
        .iter()
        .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
        .unwrap();
    assert_eq!(*top_signal, SignalName::BlockerDensity);
    assert!(*top_share > 0.0);

    // The audit row carries a frozen snapshot equal to the one scored
    let stored = storage.get_prediction(&record.prediction_id).await.unwrap();
    assert_eq!(stored.signal_snapshot, record.signal_snapshot);
}

#[tokio::test]
async fn outcome_backfill_is_write_once_and_feeds_calibration() {
    let (engine, storage) = engine_with_storage().await;

    // Synthetic closed predictions: 100 in the [0.4, 0.5) bucket, 42 slips
    for i in 0..100 {
        let record = test_utils::sample_prediction("SPR-1", 0.41 + (i % 9) as f64 * 0.01);
        storage.insert_prediction(&record).await.unwrap();
        let outcome = if i % 100 < 42 {
            SprintOutcome::Slipped
        } else {
            SprintOutcome::Delivered
        };
        engine
            .backfill_outcome(&record.prediction_id, outcome)
            .await
            .unwrap();

        // Re-backfilling the same value is a no-op; a differing value is a
        // hard conflict
        engine
            .backfill_outcome(&record.prediction_id, outcome)
            .await
            .unwrap();
        let flipped = if outcome.is_slip() {
            SprintOutcome::Delivered
        } else {
            SprintOutcome::Slipped
        };
        assert!(matches!(
            engine.backfill_outcome(&record.prediction_id, flipped).await,
            Err(PulseError::OutcomeConflict { .. })
        ));
    }

    let report = engine
        .calibration_report(&CalibrationFilter::default())
        .await
        .unwrap();
    assert_eq!(report.len(), 10);
    let bucket = &report[4];
    assert_eq!(bucket.sample_count, 100);
    assert!((bucket.observed_slip_rate - 0.42).abs() < 1e-9);
}

#[tokio::test]
async fn predicting_without_a_snapshot_is_a_named_error() {
    let (engine, _storage) = engine_with_storage().await;
    let err = engine
        .predict_sprint(
            &SprintId::new("SPR-4"),
            NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PulseError::SnapshotNotFound { .. }));
}
