//! Weighted risk scoring with a versioned rescaling strategy
//!
//! The scoring function is a transparent linear combination of normalized
//! signals — no learned model. The rescaling formula is pinned behind a
//! version string so historical prediction records stay reproducible as the
//! formula evolves: a new formula is a new [`RiskModel`] variant, never an
//! in-place change to an existing one.

use crate::error::{PulseError, Result};
use crate::types::{DailySnapshot, SignalName, WeightVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Contributions below this magnitude of summed weighted score are treated
/// as an all-zero snapshot
const CONTRIBUTION_EPSILON: f64 = 1e-12;

/// Confidence multiplier when fewer than half the signals were computable
const LOW_COVERAGE_FACTOR: f64 = 0.8;

/// Versioned rescaling strategy mapping the raw weighted sum into [0, 1]
///
/// Every variant must be monotonic, and a `model_version` string always
/// selects the same formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskModel {
    /// Logistic rescale: `risk = 1 / (1 + e^-raw)`. A raw score of 0 (all
    /// signals at baseline, or nothing to score) lands exactly on 0.5.
    LogisticV1,
}

impl RiskModel {
    pub const LOGISTIC_V1: &'static str = "logistic-v1";

    /// Select the strategy pinned by a stored version string
    pub fn from_version(version: &str) -> Result<Self> {
        match version {
            Self::LOGISTIC_V1 => Ok(RiskModel::LogisticV1),
            other => Err(PulseError::UnknownModelVersion(other.to_string())),
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            RiskModel::LogisticV1 => Self::LOGISTIC_V1,
        }
    }

    /// Monotonic map from the raw weighted sum to a risk in [0, 1]
    pub fn rescale(&self, raw: f64) -> f64 {
        match self {
            RiskModel::LogisticV1 => 1.0 / (1.0 + (-raw).exp()),
        }
    }
}

impl std::fmt::Display for RiskModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version())
    }
}

/// One scored snapshot: risk, explainability breakdown, and confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Risk score in [0, 1]
    pub risk: f64,

    /// Signed per-signal fraction of the explained score; absolute values
    /// sum to 1 when any weighted signal is non-zero
    pub contributions: BTreeMap<SignalName, f64>,

    /// Confidence in [0, 1]
    pub confidence: f64,

    pub model_version: String,
}

/// Scores materialized snapshots against a team's weight vector
#[derive(Debug, Clone, Copy)]
pub struct PredictionEngine {
    model: RiskModel,
}

impl PredictionEngine {
    pub fn new(model: RiskModel) -> Self {
        Self { model }
    }

    /// Construct from a pinned version string
    pub fn with_version(version: &str) -> Result<Self> {
        Ok(Self::new(RiskModel::from_version(version)?))
    }

    pub fn model(&self) -> RiskModel {
        self.model
    }

    /// Score one snapshot.
    ///
    /// `raw = Σ weight_i × z_i` over signals present in the snapshot; missing
    /// signals are excluded, weight entries absent from the vector fall back
    /// to per-signal defaults, and unknown names in the vector are ignored.
    /// Never fails: ill-conditioned inputs degrade confidence instead.
    pub fn predict(&self, snapshot: &DailySnapshot, weights: &WeightVector) -> Prediction {
        let mut raw = 0.0;
        let mut terms: Vec<(SignalName, f64)> = Vec::with_capacity(snapshot.normalized.len());

        for (signal, z) in &snapshot.normalized {
            let term = weights.weight_for(*signal) * z;
            raw += term;
            terms.push((*signal, term));
        }

        let magnitude: f64 = terms.iter().map(|(_, t)| t.abs()).sum();
        let contributions: BTreeMap<SignalName, f64> = terms
            .iter()
            .map(|(signal, term)| {
                let share = if magnitude > CONTRIBUTION_EPSILON {
                    term / magnitude
                } else {
                    0.0
                };
                (*signal, share)
            })
            .collect();

        let risk = self.model.rescale(raw).clamp(0.0, 1.0);
        let confidence = self.confidence(snapshot);

        debug!(
            "Scored sprint {} ({}): raw={:.4} risk={:.3} confidence={:.3}",
            snapshot.sprint_id,
            self.model.version(),
            raw,
            risk,
            confidence
        );

        Prediction {
            risk,
            contributions,
            confidence,
            model_version: self.model.version().to_string(),
        }
    }

    /// Confidence starts at the snapshot's data-quality score, takes a fixed
    /// 20% cut when fewer than half of the 8 signals were computable, and is
    /// further reduced proportionally to the low-confidence baseline count.
    fn confidence(&self, snapshot: &DailySnapshot) -> f64 {
        let mut confidence = snapshot.data_quality();

        let computable = snapshot.signals.values.len();
        if computable * 2 < SignalName::COUNT {
            confidence *= LOW_COVERAGE_FACTOR;
        }

        let low = snapshot.low_confidence.len() as f64;
        confidence *= 1.0 - (low / SignalName::COUNT as f64) * 0.5;

        confidence.clamp(0.0, 1.0)
    }
}
