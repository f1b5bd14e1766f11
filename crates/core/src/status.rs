//! Job status snapshot contract.
//!
//! A [`StatusSnapshot`] is one immutable observation of a job. The
//! client never edits a snapshot; every new one replaces the last.
//!
//! The status endpoint returns every field. The push channel sends a
//! reduced form without `params` or timestamps, so those fields are
//! optional and default when absent.

use serde::{Deserialize, Serialize};

use crate::generation::GenerateRequest;
use crate::timestamp;
use crate::types::{JobId, Timestamp};

/// Outstanding percent of work the server gets through per second
/// (0.2 s per percent).
const PERCENT_PER_SECOND: u64 = 5;

/// Lifecycle status of a generation job.
///
/// `Done` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a job at one instant, as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Percentage complete. Not clamped on the wire; see
    /// [`progress_percent`](Self::progress_percent).
    #[serde(default)]
    pub progress: i32,
    #[serde(default)]
    pub message: String,
    /// Set only when `status` is `done`.
    #[serde(default)]
    pub result_url: Option<String>,
    /// Set only when `status` is `error`.
    #[serde(default)]
    pub error: Option<String>,
    /// The original request echoed back. Absent on push-channel frames.
    #[serde(default)]
    pub params: Option<GenerateRequest>,
    #[serde(default, with = "timestamp::optional")]
    pub created_at: Option<Timestamp>,
    #[serde(default, with = "timestamp::optional")]
    pub started_at: Option<Timestamp>,
    #[serde(default, with = "timestamp::optional")]
    pub completed_at: Option<Timestamp>,
}

impl StatusSnapshot {
    /// Minimal snapshot with no payload fields set.
    pub fn new(job_id: impl Into<JobId>, status: JobStatus, progress: i32) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            progress,
            message: String::new(),
            result_url: None,
            error: None,
            params: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = Some(url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Decode a JSON body into a snapshot.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress clamped to `0..=100` for display.
    pub fn progress_percent(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }

    /// Rough seconds left while the job is running, otherwise `None`.
    pub fn estimated_seconds_remaining(&self) -> Option<u64> {
        if self.status != JobStatus::Running {
            return None;
        }
        let outstanding = 100 - u64::from(self.progress_percent());
        Some(outstanding.div_ceil(PERCENT_PER_SECOND))
    }

    /// Whether the present timestamps are ordered
    /// `created_at <= started_at <= completed_at`.
    pub fn timestamps_ordered(&self) -> bool {
        let stamps: Vec<Timestamp> = [self.created_at, self.started_at, self.completed_at]
            .into_iter()
            .flatten()
            .collect();
        stamps.windows(2).all(|pair| pair[0] <= pair[1])
    }
}
