//! Core data types for the SprintPulse risk engine
//!
//! This module defines the fundamental data structures used throughout
//! sprintpulse: raw telemetry events, the 8-signal set, daily snapshots,
//! per-team weight vectors, and the audit-trail prediction record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Version stamped on every persisted snapshot and prediction row.
///
/// Readers must tolerate rows carrying a newer version with extra optional
/// fields (decoded with serde defaults).
pub const SCHEMA_VERSION: u32 = 1;

/// Identifier of a sprint in the upstream issue system
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SprintId(pub String);

impl SprintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SprintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a team owning sprints, baselines, and weight vectors
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issue key, e.g. "PROJ-1234"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueKey(pub String);

impl IssueKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IssueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for audit-trail prediction records
///
/// Wraps a UUID to prevent mixing prediction IDs with other string-based
/// identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionId(pub Uuid);

impl PredictionId {
    /// Create a new random prediction ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a prediction ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PredictionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PredictionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable raw issue-change event as delivered by webhooks or polling
///
/// The pair `(event_id, source)` is globally unique; a second insert with the
/// same pair is a no-op, not an error. The payload is carried opaquely here
/// and only interpreted by the signal extractor (see [`crate::events`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Delivery identifier assigned by the source system
    pub event_id: String,

    /// Originating system ("webhook", "poller", ...)
    pub source: String,

    /// Sprint this event belongs to
    pub sprint_id: SprintId,

    /// Issue the change applies to, if issue-scoped
    pub issue_key: Option<IssueKey>,

    /// Opaque structured payload
    pub payload: serde_json::Value,

    /// When this delivery was received
    pub received_at: DateTime<Utc>,
}

/// The closed set of 8 sprint-health signals
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalName {
    /// Least-squares slope of closed story points across recent completed
    /// sprints
    VelocityTrend,

    /// Actual burn rate minus the ideal linear burn rate; negative = behind
    BurndownSlope,

    /// Fraction of sprint issues currently blocked
    BlockerDensity,

    /// Age in days of the oldest currently-blocked issue
    BlockerAgeMax,

    /// Time-normalized fraction of issues added after sprint start
    ScopeCreepRate,

    /// Spread of actual-vs-estimated effort in the last completed sprint
    EstimateVariance,

    /// Median days-per-point to close an issue
    IssueResolutionVelocity,

    /// Severity-weighted retrospective annotations per issue
    RetrospectiveBlockerWeight,
}

impl SignalName {
    /// Number of signals in the closed set
    pub const COUNT: usize = 8;

    /// All signals, in canonical order
    pub const ALL: [SignalName; Self::COUNT] = [
        SignalName::VelocityTrend,
        SignalName::BurndownSlope,
        SignalName::BlockerDensity,
        SignalName::BlockerAgeMax,
        SignalName::ScopeCreepRate,
        SignalName::EstimateVariance,
        SignalName::IssueResolutionVelocity,
        SignalName::RetrospectiveBlockerWeight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::VelocityTrend => "velocity_trend",
            SignalName::BurndownSlope => "burndown_slope",
            SignalName::BlockerDensity => "blocker_density",
            SignalName::BlockerAgeMax => "blocker_age_max",
            SignalName::ScopeCreepRate => "scope_creep_rate",
            SignalName::EstimateVariance => "estimate_variance",
            SignalName::IssueResolutionVelocity => "issue_resolution_velocity",
            SignalName::RetrospectiveBlockerWeight => "retrospective_blocker_weight",
        }
    }

    /// Parse a signal name from its wire form. Unknown names return `None`
    /// so weight vectors with extra entries stay schema-tolerant.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|sig| sig.as_str() == s)
    }

    /// Default weight applied to this signal's z-score when a team has no
    /// stored weight vector (or its vector is missing an entry).
    ///
    /// Signs follow the direction of the raw signal: a rising velocity trend
    /// or an ahead-of-pace burndown reduces risk, so both carry negative
    /// weights; the remaining signals grow with trouble and carry positive
    /// weights.
    pub fn default_weight(&self) -> f64 {
        match self {
            SignalName::VelocityTrend => -0.15,
            SignalName::BurndownSlope => -0.20,
            SignalName::BlockerDensity => 0.20,
            SignalName::BlockerAgeMax => 0.10,
            SignalName::ScopeCreepRate => 0.15,
            SignalName::EstimateVariance => 0.10,
            SignalName::IssueResolutionVelocity => 0.05,
            SignalName::RetrospectiveBlockerWeight => 0.05,
        }
    }
}

impl std::fmt::Display for SignalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The raw signals computed for one sprint at one point in time
///
/// Exactly 8 signals are accounted for: every signal is either present in
/// `values` or listed in `missing`. Missing signals are excluded from the
/// weighted sum downstream, never defaulted to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    /// Successfully computed signals
    pub values: BTreeMap<SignalName, f64>,

    /// Signals whose prerequisite data was absent
    pub missing: BTreeSet<SignalName>,
}

impl SignalSet {
    pub fn insert(&mut self, signal: SignalName, value: f64) {
        self.values.insert(signal, value);
        self.missing.remove(&signal);
    }

    pub fn mark_missing(&mut self, signal: SignalName) {
        self.values.remove(&signal);
        self.missing.insert(signal);
    }

    pub fn get(&self, signal: SignalName) -> Option<f64> {
        self.values.get(&signal).copied()
    }

    /// Fraction of the 8 signals successfully computed: `1 - missing/8`
    pub fn data_quality(&self) -> f64 {
        1.0 - self.missing.len() as f64 / SignalName::COUNT as f64
    }
}

/// One materialized row per (sprint, date): raw signals plus their
/// z-score-normalized counterpart
///
/// Immutable once written for a given date; re-materialization replaces the
/// row with byte-identical content when inputs are unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    pub sprint_id: SprintId,

    /// UTC day this snapshot covers (events through end of day)
    pub date: NaiveDate,

    /// Raw signal values and the missing-signal record
    pub signals: SignalSet,

    /// Z-scores against the team's rolling baseline, for each computed signal
    pub normalized: BTreeMap<SignalName, f64>,

    /// Signals normalized against a thin or degenerate baseline; these fall
    /// back to a neutral z of 0 and degrade prediction confidence
    pub low_confidence: BTreeSet<SignalName>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl DailySnapshot {
    /// Fraction of the 8 signals computable from available data
    pub fn data_quality(&self) -> f64 {
        self.signals.data_quality()
    }
}

/// Per-team mapping from signal name to scoring weight
///
/// Mutated only by an explicit administrative action outside this core;
/// read-only to the prediction engine. Missing entries fall back to
/// [`SignalName::default_weight`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub team_id: TeamId,

    /// Stored vectors may carry entries for signal names this version does
    /// not know; those are dropped on read rather than rejected
    #[serde(deserialize_with = "known_signal_weights")]
    pub weights: BTreeMap<SignalName, f64>,

    /// Who last changed these weights
    pub updated_by: String,

    pub updated_at: DateTime<Utc>,
}

fn known_signal_weights<'de, D>(deserializer: D) -> Result<BTreeMap<SignalName, f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, weight)| SignalName::from_str_opt(&name).map(|s| (s, weight)))
        .collect())
}

impl WeightVector {
    /// The documented default weights for a team with no stored vector
    pub fn defaults(team_id: TeamId) -> Self {
        let mut weights = BTreeMap::new();
        for signal in SignalName::ALL {
            weights.insert(signal, signal.default_weight());
        }
        Self {
            team_id,
            weights,
            updated_by: "default".to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Weight for a signal, falling back to the per-signal default
    pub fn weight_for(&self, signal: SignalName) -> f64 {
        self.weights
            .get(&signal)
            .copied()
            .unwrap_or_else(|| signal.default_weight())
    }
}

/// Realized outcome of a sprint, backfilled once the sprint closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintOutcome {
    /// Committed scope delivered on time
    Delivered,

    /// Sprint slipped: scope dropped or deadline missed
    Slipped,
}

impl SprintOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintOutcome::Delivered => "delivered",
            SprintOutcome::Slipped => "slipped",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(SprintOutcome::Delivered),
            "slipped" => Some(SprintOutcome::Slipped),
            _ => None,
        }
    }

    pub fn is_slip(&self) -> bool {
        matches!(self, SprintOutcome::Slipped)
    }
}

/// Immutable audit row: one prediction with the full snapshot it was
/// computed from
///
/// `signal_snapshot` is a frozen copy, not a live reference; later snapshot
/// replacements never alter historical audit rows. The only permitted
/// mutation is setting `actual_outcome` exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    pub prediction_id: PredictionId,

    pub sprint_id: SprintId,

    /// Risk score in [0, 1]
    pub predicted_risk: f64,

    /// Confidence in [0, 1], derived from data quality and baseline health
    pub predicted_confidence: f64,

    /// Pins the exact rescaling/weighting formula used (reproducibility)
    pub model_version: String,

    /// Signed per-signal fractions of the explained score
    pub contributions: BTreeMap<SignalName, f64>,

    /// Frozen copy of the snapshot the prediction was computed from
    pub signal_snapshot: DailySnapshot,

    pub created_at: DateTime<Utc>,

    /// Null until the sprint closes, then set exactly once
    #[serde(default)]
    pub actual_outcome: Option<SprintOutcome>,
}

/// Human-entered retrospective annotation feeding
/// [`SignalName::RetrospectiveBlockerWeight`]; append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrospectiveTag {
    pub sprint_id: SprintId,

    pub issue_key: IssueKey,

    /// Free-form category ("external_dependency", "unclear_requirements", ...)
    pub tag: String,

    /// Severity in [1, 5]
    pub severity: u8,

    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a sprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintState {
    Active,
    Completed,
}

impl SprintState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintState::Active => "active",
            SprintState::Completed => "completed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SprintState::Active),
            "completed" => Some(SprintState::Completed),
            _ => None,
        }
    }
}

/// Sprint metadata seeded by the external issue system; read-only here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub sprint_id: SprintId,
    pub team_id: TeamId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub state: SprintState,
}

impl SprintRecord {
    /// Planned sprint length in days
    pub fn length_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

/// Condensed view of a completed sprint, derived by replaying its event log
///
/// Feeds `velocity_trend` (closed points) and `estimate_variance`
/// (actual-minus-estimated effort deltas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintSummary {
    pub sprint_id: SprintId,
    pub end_date: NaiveDate,

    /// Story points of issues closed by sprint end
    pub closed_points: f64,

    /// (actual effort - estimated effort) per estimated, closed issue
    pub effort_deltas: Vec<f64>,
}

/// Selection criteria for the calibration report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFilter {
    /// Restrict to these sprints (None = all)
    pub sprint_ids: Option<Vec<SprintId>>,

    /// Only predictions created at or after this instant
    pub from: Option<DateTime<Utc>>,

    /// Only predictions created before this instant
    pub to: Option<DateTime<Utc>>,

    /// Number of equal-width risk buckets (default 10 = deciles)
    pub buckets: usize,
}

impl Default for CalibrationFilter {
    fn default() -> Self {
        Self {
            sprint_ids: None,
            from: None,
            to: None,
            buckets: 10,
        }
    }
}
