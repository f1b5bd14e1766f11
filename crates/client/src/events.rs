//! Lifecycle events emitted by a [`JobTracker`](crate::tracker::JobTracker).
//!
//! These describe what the tracker did, not what the job did: they are
//! diagnostics for logs and dashboards. Terminal outcomes still go
//! through the listener callbacks, which fire at most once.

use serde::Serialize;

use audiogen_core::status::JobStatus;
use audiogen_core::types::JobId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// The push channel was opened for the job.
    StreamOpened { job_id: JobId },

    /// The push channel was unusable; the tracker is now polling.
    FellBackToPolling { job_id: JobId, reason: String },

    /// A snapshot replaced the displayed state.
    SnapshotApplied {
        job_id: JobId,
        status: JobStatus,
        progress: i32,
    },

    /// The job finished and the success callback fired.
    Completed {
        job_id: JobId,
        result_url: Option<String>,
    },

    /// The job failed and the failure callback fired.
    Failed {
        job_id: JobId,
        error: Option<String>,
    },

    /// Observation stopped without a terminal status.
    Cancelled { job_id: JobId },
}
