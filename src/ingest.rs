//! Event ingestion and deduplication
//!
//! The ingestion path is built for noisy producers: webhook retries and
//! overlapping polling windows routinely redeliver the same event.
//! Uniqueness of (event_id, source) is enforced atomically at the storage
//! boundary, so concurrent writers need no external locking; a duplicate
//! delivery comes back as a flagged receipt, never an error.

use crate::error::{PulseError, Result};
use crate::storage::StorageBackend;
use crate::types::{RawEvent, RetrospectiveTag};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Why an event was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestRejection {
    /// The (event_id, source) pair was already stored
    Duplicate,
}

/// Outcome of one ingestion attempt, returned to the API layer verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub accepted: bool,
    pub reason: Option<IngestRejection>,
}

impl IngestReceipt {
    fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    fn duplicate() -> Self {
        Self {
            accepted: false,
            reason: Some(IngestRejection::Duplicate),
        }
    }
}

/// Writes raw events and retrospective tags into the event store
pub struct IngestService {
    storage: Arc<dyn StorageBackend>,
}

impl IngestService {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Ingest one raw event.
    ///
    /// Validation failures are faults; a duplicate delivery is a normal
    /// outcome reported on the receipt.
    pub async fn ingest(&self, event: RawEvent) -> Result<IngestReceipt> {
        validate(&event)?;

        if self.storage.insert_event(&event).await? {
            debug!(
                "Accepted event {} from {} for sprint {}",
                event.event_id, event.source, event.sprint_id
            );
            Ok(IngestReceipt::accepted())
        } else {
            debug!(
                "Duplicate delivery of event {} from {}",
                event.event_id, event.source
            );
            Ok(IngestReceipt::duplicate())
        }
    }

    /// Ingest a batch, returning one receipt per event in order.
    /// Duplicates never abort the rest of the batch.
    pub async fn ingest_batch(&self, events: Vec<RawEvent>) -> Result<Vec<IngestReceipt>> {
        let mut receipts = Vec::with_capacity(events.len());
        for event in events {
            receipts.push(self.ingest(event).await?);
        }
        Ok(receipts)
    }

    /// Append a team-authored retrospective annotation
    pub async fn record_retrospective(&self, tag: RetrospectiveTag) -> Result<()> {
        if !(1..=5).contains(&tag.severity) {
            return Err(PulseError::InvalidEvent(format!(
                "Retrospective severity must be in [1, 5], got {}",
                tag.severity
            )));
        }
        self.storage.insert_retrospective_tag(&tag).await
    }
}

fn validate(event: &RawEvent) -> Result<()> {
    if event.event_id.is_empty() {
        return Err(PulseError::InvalidEvent("Empty event_id".to_string()));
    }
    if event.source.is_empty() {
        return Err(PulseError::InvalidEvent("Empty source".to_string()));
    }
    if event.sprint_id.as_str().is_empty() {
        return Err(PulseError::InvalidEvent("Empty sprint_id".to_string()));
    }
    Ok(())
}
