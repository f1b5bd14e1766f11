//! Polling fallback.
//!
//! Approximates the push channel by fetching the job's status on a
//! fixed cadence. Fetch errors are reported and polling carries on;
//! only [`PollHandle::stop`] (or the parent cancellation token) ends
//! the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::StatusFetcher;
use crate::delivery::Delivery;

/// Shortest cadence a poller will run at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Starts polling loops against a [`StatusFetcher`].
#[derive(Clone)]
pub struct Poller {
    fetcher: Arc<dyn StatusFetcher>,
    interval: Duration,
}

/// Handle to one running polling loop.
///
/// Dropping the handle stops the loop.
pub struct PollHandle {
    cancel: CancellationToken,
}

impl Poller {
    /// Intervals below [`MIN_POLL_INTERVAL`], including zero, are
    /// raised to it.
    pub fn new(fetcher: Arc<dyn StatusFetcher>, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                "Poll interval too short, using minimum",
            );
        }
        Self {
            fetcher,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `job_id`.
    ///
    /// The first fetch is issued immediately, then one per interval.
    /// Fetches never overlap: a slow response delays the next tick
    /// rather than stacking requests. Must be called within a tokio
    /// runtime.
    pub fn start(
        &self,
        job_id: &str,
        deliveries: mpsc::Sender<Delivery>,
        cancel: CancellationToken,
    ) -> PollHandle {
        let fetcher = Arc::clone(&self.fetcher);
        let job_id = job_id.to_string();
        let interval = self.interval;
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            run_polling(fetcher, job_id, interval, deliveries, task_cancel).await;
        });

        PollHandle { cancel }
    }
}

impl PollHandle {
    /// Stop polling. Idempotent; no fetch starts after this returns and
    /// any in-flight fetch is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_polling(
    fetcher: Arc<dyn StatusFetcher>,
    job_id: String,
    interval: Duration,
    deliveries: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempt = 0u64;

    tracing::info!(job_id = %job_id, interval_ms = interval.as_millis() as u64, "Polling job status");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = fetcher.fetch_status(&job_id) => result,
        };

        let delivery = match result {
            Ok(snapshot) => Delivery::Snapshot(snapshot),
            Err(e) => {
                tracing::debug!(job_id = %job_id, attempt, error = %e, "Status fetch failed");
                Delivery::FetchError(e)
            }
        };

        if deliveries.send(delivery).await.is_err() {
            break;
        }
    }

    tracing::debug!(job_id = %job_id, attempts = attempt, "Polling stopped");
}
