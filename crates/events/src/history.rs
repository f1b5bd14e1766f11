//! Payload for the "history updated" topic.
//!
//! Published exactly once when a tracked generation completes with a
//! result. Whoever persists or displays history subscribes to the bus
//! and filters on [`HISTORY_UPDATED`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use audiogen_core::generation::GenerateRequest;
use audiogen_core::types::JobId;

use crate::bus::ClientEvent;

/// Topic published after a finished generation is added to history.
pub const HISTORY_UPDATED: &str = "history.updated";

/// One completed generation, as handed to the history collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub job_id: JobId,
    pub prompt: String,
    pub model: String,
    /// Requested clip length in seconds.
    pub duration: u32,
    pub result_url: String,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(job_id: impl Into<JobId>, params: &GenerateRequest, result_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job_id.into(),
            prompt: params.prompt.clone(),
            model: params.model.clone(),
            duration: params.duration,
            result_url: result_url.into(),
            created_at: Utc::now(),
        }
    }

    /// Wrap the entry in a [`HISTORY_UPDATED`] event.
    pub fn into_event(self) -> ClientEvent {
        let job_id = self.job_id.clone();
        // HistoryEntry holds only plain strings, numbers and timestamps.
        let payload = serde_json::to_value(&self).unwrap_or_default();
        ClientEvent::new(HISTORY_UPDATED)
            .with_job(job_id)
            .with_payload(payload)
    }

    /// Recover an entry from a [`HISTORY_UPDATED`] event.
    pub fn from_event(event: &ClientEvent) -> Option<Self> {
        if !event.is(HISTORY_UPDATED) {
            return None;
        }
        serde_json::from_value(event.payload.clone()).ok()
    }
}
