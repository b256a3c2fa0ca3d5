//! Shared fixtures for storage and integration tests
//!
//! Deliberately public: the integration tests under `tests/` build on the
//! same sample data as the in-module unit tests.

use crate::events::{EventPayload, IssueStatus};
use crate::types::{
    DailySnapshot, IssueKey, PredictionId, PredictionRecord, RawEvent, SignalName, SignalSet,
    SprintId, SprintRecord, SprintState, TeamId, SCHEMA_VERSION,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Install a tracing subscriber honoring `RUST_LOG`, for debugging test runs.
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A minimal issue-added event for dedup-oriented tests
pub fn sample_event(event_id: &str, source: &str, sprint_id: &str) -> RawEvent {
    let occurred_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    RawEvent {
        event_id: event_id.to_string(),
        source: source.to_string(),
        sprint_id: SprintId::new(sprint_id),
        issue_key: Some(IssueKey::new("PROJ-1")),
        payload: serde_json::to_value(EventPayload::IssueAdded {
            points: Some(3.0),
            occurred_at,
        })
        .expect("payload serializes"),
        received_at: occurred_at,
    }
}

/// An issue-scoped event with an explicit payload and receipt time
pub fn payload_event(
    event_id: &str,
    sprint_id: &str,
    issue: &str,
    payload: EventPayload,
    received_at: DateTime<Utc>,
) -> RawEvent {
    RawEvent {
        event_id: event_id.to_string(),
        source: "webhook".to_string(),
        sprint_id: SprintId::new(sprint_id),
        issue_key: Some(IssueKey::new(issue)),
        payload: serde_json::to_value(&payload).expect("payload serializes"),
        received_at,
    }
}

/// Three completed sprints (SPR-1..3) plus one active sprint (SPR-4) for
/// team-a, the active one running 2026-03-02 through 2026-03-12
pub fn sample_sprint_history() -> Vec<SprintRecord> {
    let team = TeamId::new("team-a");
    let mut sprints: Vec<SprintRecord> = (1..=3)
        .map(|i| {
            let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
                + chrono::Duration::days((i - 1) * 14);
            SprintRecord {
                sprint_id: SprintId::new(format!("SPR-{i}")),
                team_id: team.clone(),
                name: format!("Sprint {i}"),
                start_date: start,
                end_date: start + chrono::Duration::days(10),
                state: SprintState::Completed,
            }
        })
        .collect();

    sprints.push(SprintRecord {
        sprint_id: SprintId::new("SPR-4"),
        team_id: team,
        name: "Sprint 4".to_string(),
        start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
        state: SprintState::Active,
    });
    sprints
}

/// Seed a completed sprint's event log: `n_done` issues of `points` each
/// closed mid-sprint, each with actual effort `points + delta`
pub fn completed_sprint_events(
    sprint: &SprintRecord,
    n_done: usize,
    points: f64,
    delta: f64,
) -> Vec<RawEvent> {
    let day0 = sprint
        .start_date
        .and_time(chrono::NaiveTime::MIN)
        .and_utc();
    let mut events = Vec::new();
    for i in 0..n_done {
        let issue = format!("{}-{}", sprint.sprint_id, i);
        events.push(payload_event(
            &format!("{}-add-{i}", sprint.sprint_id),
            sprint.sprint_id.as_str(),
            &issue,
            EventPayload::IssueAdded {
                points: Some(points),
                occurred_at: day0,
            },
            day0,
        ));
        let done_at = day0 + chrono::Duration::days(5);
        events.push(payload_event(
            &format!("{}-done-{i}", sprint.sprint_id),
            sprint.sprint_id.as_str(),
            &issue,
            EventPayload::StatusChanged {
                status: IssueStatus::Done,
                occurred_at: done_at,
            },
            done_at,
        ));
        events.push(payload_event(
            &format!("{}-effort-{i}", sprint.sprint_id),
            sprint.sprint_id.as_str(),
            &issue,
            EventPayload::EffortLogged {
                hours: points + delta + i as f64 * 0.5,
            },
            done_at,
        ));
    }
    events
}

/// A snapshot with one computed signal, enough for persistence tests
pub fn sample_snapshot(sprint_id: &str, year: i32, month: u32, day: u32) -> DailySnapshot {
    let mut signals = SignalSet::default();
    for signal in SignalName::ALL {
        signals.mark_missing(signal);
    }
    signals.insert(SignalName::BlockerDensity, 0.25);

    let mut normalized = BTreeMap::new();
    normalized.insert(SignalName::BlockerDensity, 1.5);

    DailySnapshot {
        schema_version: SCHEMA_VERSION,
        sprint_id: SprintId::new(sprint_id),
        date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
        signals,
        normalized,
        low_confidence: BTreeSet::new(),
    }
}

/// A prediction record frozen over [`sample_snapshot`]
pub fn sample_prediction(sprint_id: &str, risk: f64) -> PredictionRecord {
    PredictionRecord {
        schema_version: SCHEMA_VERSION,
        prediction_id: PredictionId::new(),
        sprint_id: SprintId::new(sprint_id),
        predicted_risk: risk,
        predicted_confidence: 0.75,
        model_version: "logistic-v1".to_string(),
        contributions: BTreeMap::new(),
        signal_snapshot: sample_snapshot(sprint_id, 2026, 3, 8),
        created_at: Utc.with_ymd_and_hms(2026, 3, 8, 23, 59, 0).unwrap(),
        actual_outcome: None,
    }
}
