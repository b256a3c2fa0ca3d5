//! Signal extraction: 8 sprint-health signals from the raw event log
//!
//! [`extract`] is a pure, deterministic function over its inputs — the same
//! events, tags, and prior-sprint summaries always produce the same
//! [`SignalSet`], which is what makes historical predictions reproducible
//! from stored inputs.
//!
//! Missing-data policy: a signal whose prerequisite data is absent is
//! recorded in `SignalSet::missing` and excluded from the weighted sum
//! downstream, never defaulted to zero.

use crate::events::{replay, IssueState};
use crate::types::{
    IssueKey, RawEvent, RetrospectiveTag, SignalName, SignalSet, SprintRecord, SprintSummary,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Everything the extractor needs, fetched by the materializer
#[derive(Debug, Clone)]
pub struct ExtractionContext<'a> {
    pub sprint: &'a SprintRecord,

    /// Event log for this sprint, in receipt order, already cut off at the
    /// materialization instant
    pub events: &'a [RawEvent],

    pub tags: &'a [RetrospectiveTag],

    /// Summaries of the team's most recently completed sprints (chronological
    /// order, at most 3), ending before `as_of`
    pub prior_sprints: &'a [SprintSummary],

    /// Extraction instant; signals are computed as of this time
    pub as_of: DateTime<Utc>,
}

/// Compute the 8 raw signals for a sprint
pub fn extract(ctx: &ExtractionContext) -> SignalSet {
    let all_issues = replay(ctx.events);
    let issues: BTreeMap<&IssueKey, &IssueState> = all_issues
        .iter()
        .filter(|(_, state)| !state.removed)
        .collect();

    let mut set = SignalSet::default();
    for signal in SignalName::ALL {
        let value = match signal {
            SignalName::VelocityTrend => velocity_trend(ctx.prior_sprints),
            SignalName::BurndownSlope => burndown_slope(ctx, &issues),
            SignalName::BlockerDensity => blocker_density(&issues),
            SignalName::BlockerAgeMax => blocker_age_max(ctx.as_of, &issues),
            SignalName::ScopeCreepRate => scope_creep_rate(ctx, &issues),
            SignalName::EstimateVariance => estimate_variance(ctx.prior_sprints),
            SignalName::IssueResolutionVelocity => issue_resolution_velocity(&issues),
            SignalName::RetrospectiveBlockerWeight => {
                retrospective_blocker_weight(ctx.tags, &issues)
            }
        };
        match value {
            Some(v) => set.insert(signal, v),
            None => set.mark_missing(signal),
        }
    }
    set
}

/// Least-squares slope of closed story points across the most recent
/// completed sprints. Requires at least 2 prior sprints.
fn velocity_trend(prior: &[SprintSummary]) -> Option<f64> {
    if prior.len() < 2 {
        return None;
    }
    let points: Vec<f64> = prior.iter().map(|s| s.closed_points).collect();
    Some(least_squares_slope(&points))
}

/// Actual burn rate minus the ideal linear burn rate.
///
/// (points resolved so far / elapsed days) - (total points / sprint length).
/// Positive means ahead of pace, negative behind.
fn burndown_slope(
    ctx: &ExtractionContext,
    issues: &BTreeMap<&IssueKey, &IssueState>,
) -> Option<f64> {
    let elapsed = elapsed_days(ctx)?;
    let length = ctx.sprint.length_days() as f64;
    if length <= 0.0 {
        return None;
    }

    let total_points: f64 = issues.values().filter_map(|s| s.points).sum();
    if total_points <= 0.0 {
        return None;
    }

    let resolved_points: f64 = issues
        .values()
        .filter(|s| s.status.is_done())
        .filter_map(|s| s.points)
        .sum();

    Some(resolved_points / elapsed - total_points / length)
}

/// Fraction of sprint issues currently in a blocked state
fn blocker_density(issues: &BTreeMap<&IssueKey, &IssueState>) -> Option<f64> {
    if issues.is_empty() {
        return None;
    }
    let blocked = issues.values().filter(|s| s.status.is_blocked()).count();
    Some(blocked as f64 / issues.len() as f64)
}

/// Age in days of the oldest currently-blocked issue; 0 if none blocked
fn blocker_age_max(
    as_of: DateTime<Utc>,
    issues: &BTreeMap<&IssueKey, &IssueState>,
) -> Option<f64> {
    if issues.is_empty() {
        return None;
    }
    let max_age = issues
        .values()
        .filter(|s| s.status.is_blocked())
        .filter_map(|s| s.blocked_since)
        .map(|since| (as_of - since).num_seconds() as f64 / SECONDS_PER_DAY)
        .fold(0.0_f64, f64::max);
    Some(max_age.max(0.0))
}

/// Issues added after sprint start as a fraction of total issues, divided by
/// the elapsed fraction of the sprint. The time normalization weighs creep
/// per unit of sprint time, so early and late additions penalize equally.
fn scope_creep_rate(
    ctx: &ExtractionContext,
    issues: &BTreeMap<&IssueKey, &IssueState>,
) -> Option<f64> {
    if issues.is_empty() {
        return None;
    }
    let elapsed = elapsed_days(ctx)?;
    let length = ctx.sprint.length_days() as f64;
    if length <= 0.0 {
        return None;
    }
    let elapsed_fraction = (elapsed / length).min(1.0);

    let late_added = issues
        .values()
        .filter(|s| s.added_at.date_naive() > ctx.sprint.start_date)
        .count();

    Some(late_added as f64 / issues.len() as f64 / elapsed_fraction)
}

/// Sample standard deviation of (actual - estimated effort) in the most
/// recently completed sprint. Requires at least 2 estimated, closed issues.
fn estimate_variance(prior: &[SprintSummary]) -> Option<f64> {
    let last = prior.last()?;
    sample_stddev(&last.effort_deltas)
}

/// Median days-per-point to close an issue; zero-point issues excluded
fn issue_resolution_velocity(issues: &BTreeMap<&IssueKey, &IssueState>) -> Option<f64> {
    let mut rates: Vec<f64> = issues
        .values()
        .filter(|s| s.status.is_done())
        .filter_map(|s| {
            let points = s.points.filter(|p| *p > 0.0)?;
            let resolved_at = s.resolved_at?;
            let started = s.started_at.unwrap_or(s.added_at);
            let days = ((resolved_at - started).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
            Some(days / points)
        })
        .collect();
    median(&mut rates)
}

/// Sum of retrospective tag severities for the sprint's issues, normalized
/// by issue count. No tags is a real 0, not missing data.
fn retrospective_blocker_weight(
    tags: &[RetrospectiveTag],
    issues: &BTreeMap<&IssueKey, &IssueState>,
) -> Option<f64> {
    if issues.is_empty() {
        return None;
    }
    let severity_sum: f64 = tags.iter().map(|t| t.severity as f64).sum();
    Some(severity_sum / issues.len() as f64)
}

/// Whole days elapsed since sprint start, counting the as-of day itself;
/// None before the sprint has started
fn elapsed_days(ctx: &ExtractionContext) -> Option<f64> {
    let days = (ctx.as_of.date_naive() - ctx.sprint.start_date).num_days();
    if days <= 0 {
        None
    } else {
        Some(days as f64)
    }
}

/// Slope of the least-squares line through (0, y0), (1, y1), ...
fn least_squares_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let sum_x = (0..ys.len()).map(|i| i as f64).sum::<f64>();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x_sq: f64 = (0..ys.len()).map(|i| (i as f64) * (i as f64)).sum();

    let denom = n * sum_x_sq - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denom
    }
}

/// Sample standard deviation (n - 1 denominator); None for fewer than 2 points
fn sample_stddev(xs: &[f64]) -> Option<f64> {
    let n = xs.len();
    if n < 2 {
        return None;
    }
    let mean = xs.iter().sum::<f64>() / n as f64;
    let variance = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1) as f64;
    Some(variance.sqrt())
}

fn median(xs: &mut [f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = xs.len() / 2;
    if xs.len() % 2 == 1 {
        Some(xs[mid])
    } else {
        Some((xs[mid - 1] + xs[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventPayload, IssueStatus};
    use crate::types::{SprintId, SprintState, TeamId};
    use chrono::{NaiveDate, TimeZone};

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn sprint() -> SprintRecord {
        SprintRecord {
            sprint_id: SprintId::new("SPR-1"),
            team_id: TeamId::new("team-a"),
            name: "Sprint 1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
            state: SprintState::Active,
        }
    }

    fn event(id: &str, issue: &str, payload: EventPayload, received_at: DateTime<Utc>) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            source: "test".to_string(),
            sprint_id: SprintId::new("SPR-1"),
            issue_key: Some(IssueKey::new(issue)),
            payload: serde_json::to_value(&payload).unwrap(),
            received_at,
        }
    }

    fn added(id: &str, issue: &str, points: f64, at: DateTime<Utc>) -> RawEvent {
        event(
            id,
            issue,
            EventPayload::IssueAdded {
                points: Some(points),
                occurred_at: at,
            },
            at,
        )
    }

    fn status(id: &str, issue: &str, status: IssueStatus, at: DateTime<Utc>) -> RawEvent {
        event(
            id,
            issue,
            EventPayload::StatusChanged {
                status,
                occurred_at: at,
            },
            at,
        )
    }

    fn summary(sprint: &str, end_day: u32, closed_points: f64, deltas: Vec<f64>) -> SprintSummary {
        SprintSummary {
            sprint_id: SprintId::new(sprint),
            end_date: NaiveDate::from_ymd_opt(2026, 2, end_day).unwrap(),
            closed_points,
            effort_deltas: deltas,
        }
    }

    #[test]
    fn test_burndown_slope_matches_worked_example() {
        // 30 points total, 20 closed, end of day 7 of a 10-day sprint:
        // actual 20/7 vs ideal 3/day => -0.142857...
        let events = vec![
            added("e1", "P-1", 10.0, ts(2, 9)),
            added("e2", "P-2", 10.0, ts(2, 9)),
            added("e3", "P-3", 10.0, ts(2, 9)),
            status("e4", "P-1", IssueStatus::Done, ts(4, 12)),
            status("e5", "P-2", IssueStatus::Done, ts(7, 12)),
        ];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &[],
            prior_sprints: &[],
            as_of: ts(9, 0), // midnight after day 7 (Mar 8)
        };

        let set = extract(&ctx);
        let slope = set.get(SignalName::BurndownSlope).unwrap();
        assert!((slope - (20.0 / 7.0 - 3.0)).abs() < 1e-9);
        assert!((slope + 0.142857).abs() < 1e-4);
    }

    #[test]
    fn test_blocker_signals() {
        let events = vec![
            added("e1", "P-1", 3.0, ts(2, 9)),
            added("e2", "P-2", 3.0, ts(2, 9)),
            added("e3", "P-3", 3.0, ts(2, 9)),
            added("e4", "P-4", 3.0, ts(2, 9)),
            status("e5", "P-1", IssueStatus::Blocked, ts(4, 0)),
        ];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &[],
            prior_sprints: &[],
            as_of: ts(7, 0),
        };

        let set = extract(&ctx);
        assert_eq!(set.get(SignalName::BlockerDensity), Some(0.25));
        assert!((set.get(SignalName::BlockerAgeMax).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_blocker_age_zero_when_none_blocked() {
        let events = vec![added("e1", "P-1", 3.0, ts(2, 9))];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &[],
            prior_sprints: &[],
            as_of: ts(7, 0),
        };

        assert_eq!(extract(&ctx).get(SignalName::BlockerAgeMax), Some(0.0));
    }

    #[test]
    fn test_scope_creep_is_time_normalized() {
        // 1 of 4 issues added mid-sprint, observed halfway through:
        // (1/4) / 0.5 = 0.5
        let events = vec![
            added("e1", "P-1", 3.0, ts(2, 9)),
            added("e2", "P-2", 3.0, ts(2, 9)),
            added("e3", "P-3", 3.0, ts(2, 9)),
            added("e4", "P-4", 3.0, ts(5, 9)),
        ];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &[],
            prior_sprints: &[],
            as_of: ts(7, 0), // elapsed 5 of 10 days
        };

        let set = extract(&ctx);
        assert!((set.get(SignalName::ScopeCreepRate).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_trend_requires_two_prior_sprints() {
        let sprint = sprint();
        let one_prior = [summary("SPR-0", 27, 20.0, vec![])];
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &[],
            tags: &[],
            prior_sprints: &one_prior,
            as_of: ts(7, 0),
        };
        let set = extract(&ctx);
        assert!(set.missing.contains(&SignalName::VelocityTrend));

        // Declining velocity over 3 sprints: slope -5 per sprint
        let three_prior = [
            summary("SPR-a", 1, 30.0, vec![]),
            summary("SPR-b", 14, 25.0, vec![]),
            summary("SPR-c", 27, 20.0, vec![]),
        ];
        let ctx = ExtractionContext {
            prior_sprints: &three_prior,
            ..ctx
        };
        let set = extract(&ctx);
        assert!((set.get(SignalName::VelocityTrend).unwrap() + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_variance_from_last_completed_sprint() {
        let sprint = sprint();
        let prior = [
            summary("SPR-a", 14, 25.0, vec![10.0]),
            summary("SPR-b", 27, 20.0, vec![1.0, -1.0, 3.0, -3.0]),
        ];
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &[],
            tags: &[],
            prior_sprints: &prior,
            as_of: ts(7, 0),
        };

        let set = extract(&ctx);
        // Sample stddev of [1, -1, 3, -3]: sqrt(20/3)
        let expected = (20.0_f64 / 3.0).sqrt();
        assert!((set.get(SignalName::EstimateVariance).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_velocity_median_excludes_zero_point_issues() {
        let events = vec![
            added("e1", "P-1", 2.0, ts(2, 0)),
            status("e2", "P-1", IssueStatus::InProgress, ts(2, 0)),
            status("e3", "P-1", IssueStatus::Done, ts(4, 0)), // 2 days / 2 pts = 1.0
            added("e4", "P-2", 1.0, ts(2, 0)),
            status("e5", "P-2", IssueStatus::InProgress, ts(2, 0)),
            status("e6", "P-2", IssueStatus::Done, ts(5, 0)), // 3 days / 1 pt = 3.0
            added("e7", "P-3", 0.0, ts(2, 0)),
            status("e8", "P-3", IssueStatus::Done, ts(2, 1)), // excluded: 0 points
        ];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &[],
            prior_sprints: &[],
            as_of: ts(7, 0),
        };

        let set = extract(&ctx);
        let velocity = set.get(SignalName::IssueResolutionVelocity).unwrap();
        assert!((velocity - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_retrospective_weight_normalized_by_issue_count() {
        let events = vec![
            added("e1", "P-1", 3.0, ts(2, 9)),
            added("e2", "P-2", 3.0, ts(2, 9)),
        ];
        let tags = vec![
            RetrospectiveTag {
                sprint_id: SprintId::new("SPR-1"),
                issue_key: IssueKey::new("P-1"),
                tag: "external_dependency".to_string(),
                severity: 4,
                created_at: ts(6, 0),
            },
            RetrospectiveTag {
                sprint_id: SprintId::new("SPR-1"),
                issue_key: IssueKey::new("P-2"),
                tag: "unclear_requirements".to_string(),
                severity: 2,
                created_at: ts(6, 0),
            },
        ];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &tags,
            prior_sprints: &[],
            as_of: ts(7, 0),
        };

        let set = extract(&ctx);
        assert_eq!(set.get(SignalName::RetrospectiveBlockerWeight), Some(3.0));
    }

    #[test]
    fn test_empty_sprint_marks_signals_missing_and_scores_quality() {
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &[],
            tags: &[],
            prior_sprints: &[],
            as_of: ts(7, 0),
        };

        let set = extract(&ctx);
        assert_eq!(set.values.len(), 0);
        assert_eq!(set.missing.len(), SignalName::COUNT);
        assert_eq!(set.data_quality(), 0.0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let events = vec![
            added("e1", "P-1", 5.0, ts(2, 9)),
            status("e2", "P-1", IssueStatus::Blocked, ts(3, 9)),
        ];
        let sprint = sprint();
        let ctx = ExtractionContext {
            sprint: &sprint,
            events: &events,
            tags: &[],
            prior_sprints: &[],
            as_of: ts(7, 0),
        };

        assert_eq!(extract(&ctx), extract(&ctx));
    }
}
