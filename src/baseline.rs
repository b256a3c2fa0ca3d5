//! Rolling historical baselines and z-score normalization
//!
//! Each (team, signal) pair keeps a trailing-window sample of materialized
//! raw values with running sum and sum-of-squares, so observing a new value
//! is O(1) amortized. Normalization against a thin or degenerate window
//! falls back to a neutral z of 0 and flags the signal low-confidence
//! rather than excluding it.

use crate::types::{SignalName, SprintId, TeamId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Below this, a window's spread is treated as degenerate
const STDDEV_EPSILON: f64 = 1e-9;

/// One observed raw value, keyed by its origin so re-materialization
/// replaces instead of double-counting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSample {
    pub sprint_id: SprintId,
    pub date: NaiveDate,
    pub value: f64,
}

/// Rolling mean/stddev over a trailing window of historical raw values
///
/// Samples are observed in non-decreasing date order (the materializer's
/// scan order); entries older than the window decay by exclusion on the
/// next observe, not by deletion elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingBaseline {
    window_days: i64,
    samples: VecDeque<BaselineSample>,
    sum: f64,
    sum_sq: f64,
}

impl RollingBaseline {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days,
            samples: VecDeque::new(),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Record a value for (sprint, date), replacing any prior observation
    /// under the same key, then prune entries outside the trailing window.
    pub fn observe(&mut self, sprint_id: &SprintId, date: NaiveDate, value: f64) {
        if let Some(pos) = self
            .samples
            .iter()
            .position(|s| s.sprint_id == *sprint_id && s.date == date)
        {
            if let Some(old) = self.samples.remove(pos) {
                self.sum -= old.value;
                self.sum_sq -= old.value * old.value;
            }
        }

        self.samples.push_back(BaselineSample {
            sprint_id: sprint_id.clone(),
            date,
            value,
        });
        self.sum += value;
        self.sum_sq += value * value;

        let cutoff = date - chrono::Duration::days(self.window_days);
        while let Some(front) = self.samples.front() {
            if front.date >= cutoff {
                break;
            }
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old.value;
                self.sum_sq -= old.value * old.value;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as f64)
        }
    }

    /// Sample standard deviation (n - 1 denominator)
    pub fn stddev(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let mean = self.sum / n as f64;
        let variance = (self.sum_sq - n as f64 * mean * mean) / (n - 1) as f64;
        // Running sums can go fractionally negative on degenerate windows
        Some(variance.max(0.0).sqrt())
    }
}

/// Result of normalizing one raw value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub z: f64,

    /// True when the window was too thin or degenerate for a meaningful
    /// z-score; the value fell back to neutral
    pub low_confidence: bool,
}

/// Keyed store of rolling baselines per (team, signal)
///
/// An explicit injected resource, never a module-level singleton: tests and
/// the materializer supply their own instance seeded from storage.
#[derive(Debug, Clone)]
pub struct BaselineCache {
    window_days: i64,
    min_samples: usize,
    entries: BTreeMap<(TeamId, SignalName), RollingBaseline>,
}

impl BaselineCache {
    pub fn new(window_days: i64, min_samples: usize) -> Self {
        Self {
            window_days,
            min_samples,
            entries: BTreeMap::new(),
        }
    }

    /// Install a baseline loaded from storage
    pub fn seed(&mut self, team_id: TeamId, signal: SignalName, baseline: RollingBaseline) {
        self.entries.insert((team_id, signal), baseline);
    }

    pub fn get(&self, team_id: &TeamId, signal: SignalName) -> Option<&RollingBaseline> {
        self.entries.get(&(team_id.clone(), signal))
    }

    /// Convert a raw signal value to a z-score against the team's window.
    ///
    /// Fewer than `min_samples` historical points, or a ~0 stddev, yields a
    /// neutral z of 0 flagged low-confidence. The flag degrades prediction
    /// confidence downstream; the signal is not excluded outright.
    pub fn normalize(&self, team_id: &TeamId, signal: SignalName, raw: f64) -> Normalized {
        let Some(baseline) = self.get(team_id, signal) else {
            return Normalized {
                z: 0.0,
                low_confidence: true,
            };
        };

        if baseline.len() < self.min_samples {
            debug!(
                "Baseline for {}/{} has {} samples (< {}), neutral z",
                team_id,
                signal,
                baseline.len(),
                self.min_samples
            );
            return Normalized {
                z: 0.0,
                low_confidence: true,
            };
        }

        match (baseline.mean(), baseline.stddev()) {
            (Some(mean), Some(stddev)) if stddev > STDDEV_EPSILON => Normalized {
                z: (raw - mean) / stddev,
                low_confidence: false,
            },
            _ => Normalized {
                z: 0.0,
                low_confidence: true,
            },
        }
    }

    /// Fold a freshly materialized value into the team's window, creating
    /// the window on first observation. Returns the updated baseline for
    /// persistence.
    pub fn observe(
        &mut self,
        team_id: &TeamId,
        signal: SignalName,
        sprint_id: &SprintId,
        date: NaiveDate,
        value: f64,
    ) -> &RollingBaseline {
        let entry = self
            .entries
            .entry((team_id.clone(), signal))
            .or_insert_with(|| RollingBaseline::new(self.window_days));
        entry.observe(sprint_id, date, value);
        entry
    }
}
