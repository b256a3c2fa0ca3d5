//! Typed interpretation of raw event payloads
//!
//! The event store carries payloads opaquely; this module is the single place
//! that reads them. [`replay`] folds a sprint's event log into per-issue
//! state deterministically: the same events always produce the same states,
//! which is what makes extraction reproducible for audits.

use crate::types::{IssueKey, RawEvent, SprintRecord, SprintSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Workflow status of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Blocked,
    Done,
}

impl IssueStatus {
    pub fn is_blocked(&self) -> bool {
        matches!(self, IssueStatus::Blocked)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, IssueStatus::Done)
    }
}

/// The payload shapes the extractor understands
///
/// `occurred_at` is the instant the change happened in the source system,
/// which may predate `received_at` on the envelope (webhook retries, polling
/// lag). Unrecognized payloads are skipped with a warning, never a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Issue added to the sprint (at planning or mid-sprint)
    IssueAdded {
        /// Story-point estimate, if already set
        points: Option<f64>,
        occurred_at: DateTime<Utc>,
    },

    /// Issue moved to a new workflow status
    StatusChanged {
        status: IssueStatus,
        occurred_at: DateTime<Utc>,
    },

    /// Story-point estimate changed
    PointsChanged { points: f64 },

    /// Actual effort logged against the issue
    EffortLogged { hours: f64 },

    /// Issue removed from the sprint
    IssueRemoved { occurred_at: DateTime<Utc> },
}

/// Accumulated state of one issue after replaying its events
#[derive(Debug, Clone, PartialEq)]
pub struct IssueState {
    /// When the issue entered the sprint
    pub added_at: DateTime<Utc>,

    /// Current story-point estimate
    pub points: Option<f64>,

    pub status: IssueStatus,

    /// Set while the issue sits in a blocked state
    pub blocked_since: Option<DateTime<Utc>>,

    /// First transition into in_progress
    pub started_at: Option<DateTime<Utc>>,

    /// First transition into done
    pub resolved_at: Option<DateTime<Utc>>,

    /// Total actual effort logged, in hours
    pub actual_hours: Option<f64>,

    /// Removed from the sprint; excluded from all signal computations
    pub removed: bool,
}

impl IssueState {
    fn new(added_at: DateTime<Utc>) -> Self {
        Self {
            added_at,
            points: None,
            status: IssueStatus::Open,
            blocked_since: None,
            started_at: None,
            resolved_at: None,
            actual_hours: None,
            removed: false,
        }
    }

    fn apply(&mut self, payload: &EventPayload) {
        match payload {
            EventPayload::IssueAdded { points, .. } => {
                if let Some(p) = points {
                    self.points = Some(*p);
                }
                // Re-adding a removed issue puts it back in scope
                self.removed = false;
            }
            EventPayload::StatusChanged {
                status,
                occurred_at,
            } => {
                if status.is_blocked() {
                    if self.blocked_since.is_none() {
                        self.blocked_since = Some(*occurred_at);
                    }
                } else {
                    self.blocked_since = None;
                }
                if *status == IssueStatus::InProgress && self.started_at.is_none() {
                    self.started_at = Some(*occurred_at);
                }
                if status.is_done() && self.resolved_at.is_none() {
                    self.resolved_at = Some(*occurred_at);
                }
                self.status = *status;
            }
            EventPayload::PointsChanged { points } => {
                self.points = Some(*points);
            }
            EventPayload::EffortLogged { hours } => {
                self.actual_hours = Some(self.actual_hours.unwrap_or(0.0) + hours);
            }
            EventPayload::IssueRemoved { .. } => {
                self.removed = true;
            }
        }
    }
}

/// Fold a sprint's event log into per-issue state
///
/// Events must be supplied in receipt order (the event store's scan order).
/// Events without an issue key or with unrecognized payloads are skipped.
pub fn replay(events: &[RawEvent]) -> BTreeMap<IssueKey, IssueState> {
    let mut issues: BTreeMap<IssueKey, IssueState> = BTreeMap::new();

    for event in events {
        let Some(issue_key) = &event.issue_key else {
            continue;
        };

        let payload: EventPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                warn!(
                    "Skipping unrecognized payload for event {} from {}: {}",
                    event.event_id, event.source, err
                );
                continue;
            }
        };

        let state = issues.entry(issue_key.clone()).or_insert_with(|| {
            // A status change arriving before the add event still yields a
            // usable state; the first-seen instant stands in for added_at.
            let added_at = match &payload {
                EventPayload::IssueAdded { occurred_at, .. } => *occurred_at,
                _ => event.received_at,
            };
            IssueState::new(added_at)
        });

        state.apply(&payload);
    }

    issues
}

/// Condense a completed sprint's event log into the summary consumed by
/// `velocity_trend` and `estimate_variance`
pub fn sprint_summary(sprint: &SprintRecord, events: &[RawEvent]) -> SprintSummary {
    let issues = replay(events);

    let mut closed_points = 0.0;
    let mut effort_deltas = Vec::new();

    for state in issues.values() {
        if state.removed {
            continue;
        }
        if state.status.is_done() {
            if let Some(points) = state.points {
                closed_points += points;
                if let Some(actual) = state.actual_hours {
                    effort_deltas.push(actual - points);
                }
            }
        }
    }

    SprintSummary {
        sprint_id: sprint.sprint_id.clone(),
        end_date: sprint.end_date,
        closed_points,
        effort_deltas,
    }
}
