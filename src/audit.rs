//! Prediction audit trail and calibration bookkeeping
//!
//! Every prediction is persisted with a frozen copy of the snapshot it was
//! computed from, so each risk score remains reproducible from stored inputs
//! long after the live snapshot has been replaced. Once a sprint closes, the
//! realized outcome is backfilled exactly once; the calibration report then
//! checks that a predicted risk of X% corresponds to roughly X% observed
//! slips.

use crate::error::Result;
use crate::predict::Prediction;
use crate::storage::StorageBackend;
use crate::types::{
    CalibrationFilter, DailySnapshot, PredictionId, PredictionRecord, SprintOutcome,
    SCHEMA_VERSION,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One row of the calibration report: predictions whose risk fell in
/// [lower, upper) and how often those sprints actually slipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub lower: f64,
    pub upper: f64,
    pub sample_count: usize,
    pub observed_slip_rate: f64,
    pub mean_predicted_risk: f64,
}

/// Persists predictions and their eventual outcomes
pub struct AuditRecorder {
    storage: Arc<dyn StorageBackend>,
}

impl AuditRecorder {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Write an immutable prediction record over a frozen snapshot copy
    pub async fn record(
        &self,
        snapshot: &DailySnapshot,
        prediction: &Prediction,
    ) -> Result<PredictionId> {
        let record = PredictionRecord {
            schema_version: SCHEMA_VERSION,
            prediction_id: PredictionId::new(),
            sprint_id: snapshot.sprint_id.clone(),
            predicted_risk: prediction.risk,
            predicted_confidence: prediction.confidence,
            model_version: prediction.model_version.clone(),
            contributions: prediction.contributions.clone(),
            signal_snapshot: snapshot.clone(),
            created_at: Utc::now(),
            actual_outcome: None,
        };
        self.storage.insert_prediction(&record).await?;

        info!(
            "Recorded prediction {} for {}: risk {:.3}, confidence {:.3}",
            record.prediction_id, record.sprint_id, record.predicted_risk,
            record.predicted_confidence
        );
        Ok(record.prediction_id)
    }

    /// Set the realized outcome for a closed sprint's prediction.
    ///
    /// Write-once: repeating the same value is a no-op success, a differing
    /// value is a hard [`crate::error::PulseError::OutcomeConflict`].
    pub async fn backfill_outcome(
        &self,
        prediction_id: &PredictionId,
        outcome: SprintOutcome,
    ) -> Result<()> {
        self.storage.set_outcome(prediction_id, outcome).await?;
        debug!("Outcome for prediction {}: {:?}", prediction_id, outcome);
        Ok(())
    }

    /// Bucket closed predictions by predicted risk and compute the observed
    /// slip rate per bucket. Restartable: recomputed from storage per call.
    pub async fn calibration_report(
        &self,
        filter: &CalibrationFilter,
    ) -> Result<Vec<CalibrationBucket>> {
        let buckets = filter.buckets.max(1);
        let closed = self.storage.closed_predictions(filter).await?;

        let mut counts = vec![0usize; buckets];
        let mut slips = vec![0usize; buckets];
        let mut risk_sums = vec![0.0f64; buckets];

        for record in &closed {
            let risk = record.predicted_risk.clamp(0.0, 1.0);
            // risk = 1.0 belongs to the top bucket, not a phantom one past it
            let index = ((risk * buckets as f64) as usize).min(buckets - 1);
            counts[index] += 1;
            risk_sums[index] += risk;
            if record
                .actual_outcome
                .is_some_and(|outcome| outcome.is_slip())
            {
                slips[index] += 1;
            }
        }

        let width = 1.0 / buckets as f64;
        let report = (0..buckets)
            .map(|i| CalibrationBucket {
                lower: i as f64 * width,
                upper: (i + 1) as f64 * width,
                sample_count: counts[i],
                observed_slip_rate: if counts[i] > 0 {
                    slips[i] as f64 / counts[i] as f64
                } else {
                    0.0
                },
                mean_predicted_risk: if counts[i] > 0 {
                    risk_sums[i] / counts[i] as f64
                } else {
                    0.0
                },
            })
            .collect();

        debug!(
            "Calibration report over {} closed predictions in {} buckets",
            closed.len(),
            buckets
        );
        Ok(report)
    }
}
