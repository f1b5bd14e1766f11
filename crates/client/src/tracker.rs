//! Job tracker: one observation session for one job.
//!
//! [`JobTracker::start`] spawns a session task that first opens the
//! push channel and, if that is unusable, falls back to polling. It
//! never goes back to the stream within a session. Every snapshot
//! replaces the displayed state (published on a `watch` channel) and
//! is handed to the [`TrackerListener`]. The first terminal snapshot
//! closes the active strategy and fires exactly one of
//! [`on_complete`](TrackerListener::on_complete) or
//! [`on_failure`](TrackerListener::on_failure).
//!
//! ```text
//! Initializing ──open ok──▶ StreamActive ──channel failure──▶ Polling
//!      │                        │                               │
//!      └──open failed──▶ Polling│                               │
//!                               ▼                               ▼
//!                  Terminated (done / error / cancel) ◀─────────┘
//! ```
//!
//! Completion, failure and cancellation race through one
//! [`TerminalLatch`]; whichever trips it first decides the outcome.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use audiogen_core::status::{JobStatus, StatusSnapshot};
use audiogen_core::types::JobId;

use crate::api::{StatusApi, StatusFetcher, TransportError};
use crate::config::TrackerConfig;
use crate::delivery::{ActiveStrategy, Delivery, StrategyKind, DELIVERY_CHANNEL_CAPACITY};
use crate::events::TrackerEvent;
use crate::latch::TerminalLatch;
use crate::poller::Poller;
use crate::stream::{ChannelError, EventSource, SseEventSource, StreamSubscriber};

/// Broadcast channel capacity for tracker events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Observation state of a tracker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Initializing,
    StreamActive,
    Polling,
    /// Absorbing: no callback fires and nothing stays open.
    Terminated,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOutcome {
    /// The job reached `done`. `result_url` is passed through even when
    /// the server omitted it.
    Completed { result_url: Option<String> },
    /// The job reached `error`, carrying the server's message if any.
    Failed { error: Option<String> },
    /// Observation stopped before a terminal status was seen.
    Cancelled,
}

/// Receives a session's snapshots and its single terminal outcome.
///
/// Callbacks run on the session task and should return quickly.
///
/// Once [`JobTracker::cancel`] returns, no terminal callback fires. If
/// `cancel` runs on another worker thread while a snapshot is being
/// applied, that single [`on_snapshot`](Self::on_snapshot) call may
/// still complete afterwards; no later snapshot is delivered.
pub trait TrackerListener: Send + 'static {
    /// Called for every applied snapshot, terminal ones included.
    fn on_snapshot(&mut self, _snapshot: &StatusSnapshot) {}

    /// Called at most once, when the job reaches `done`.
    fn on_complete(&mut self, result_url: Option<String>);

    /// Called at most once, when the job reaches `error`.
    fn on_failure(&mut self, error: Option<String>);

    /// Called for each failed poll. Polling continues regardless.
    fn on_fetch_error(&mut self, _error: &TransportError) {}
}

/// Listener for callers that only use [`JobTracker::wait`] and the
/// watch channels.
pub struct NoopListener;

impl TrackerListener for NoopListener {
    fn on_complete(&mut self, _result_url: Option<String>) {}
    fn on_failure(&mut self, _error: Option<String>) {}
}

/// Collaborators a tracker session needs.
#[derive(Clone)]
pub struct TrackerDeps {
    pub fetcher: Arc<dyn StatusFetcher>,
    pub events: Arc<dyn EventSource>,
    pub config: TrackerConfig,
}

/// Errors building HTTP collaborators for a tracker.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("status client: {0}")]
    Transport(#[from] TransportError),

    #[error("event stream client: {0}")]
    Channel(#[from] ChannelError),
}

impl TrackerDeps {
    /// HTTP status fetcher and SSE source for `config.api_url`.
    pub fn http(config: TrackerConfig) -> Result<Self, SetupError> {
        let fetcher = StatusApi::from_config(&config)?;
        let events = SseEventSource::from_config(&config)?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            events: Arc::new(events),
            config,
        })
    }
}

/// Handle to a running observation session.
///
/// Dropping the handle cancels the session.
pub struct JobTracker {
    job_id: JobId,
    cancel: CancellationToken,
    latch: Arc<TerminalLatch>,
    state: Arc<watch::Sender<TrackerState>>,
    snapshot_rx: watch::Receiver<Option<StatusSnapshot>>,
    event_tx: broadcast::Sender<TrackerEvent>,
    task: Option<JoinHandle<TrackerOutcome>>,
}

impl JobTracker {
    /// Start observing `job_id`. Returns immediately; must be called
    /// within a tokio runtime.
    pub fn start<L: TrackerListener>(job_id: impl Into<JobId>, deps: TrackerDeps, listener: L) -> Self {
        let job_id = job_id.into();
        let cancel = CancellationToken::new();
        let latch = Arc::new(TerminalLatch::new());
        let (state_tx, _) = watch::channel(TrackerState::Initializing);
        let state = Arc::new(state_tx);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let subscriber = if deps.config.stream_enabled {
            StreamSubscriber::new(deps.events)
        } else {
            StreamSubscriber::disabled(deps.events)
        }
        .with_connect_timeout(deps.config.stream_connect_timeout);

        let session = Session {
            job_id: job_id.clone(),
            subscriber,
            poller: Poller::new(deps.fetcher, deps.config.poll_interval),
            listener,
            snapshot_tx,
            state: Arc::clone(&state),
            event_tx: event_tx.clone(),
            cancel: cancel.clone(),
            latch: Arc::clone(&latch),
        };

        tracing::info!(job_id = %job_id, "Starting job tracker");
        let task = tokio::spawn(session.run());

        Self {
            job_id,
            cancel,
            latch,
            state,
            snapshot_rx,
            event_tx,
            task: Some(task),
        }
    }

    /// Start a tracker against the HTTP endpoints in `config`.
    pub fn start_http<L: TrackerListener>(
        job_id: impl Into<JobId>,
        config: TrackerConfig,
        listener: L,
    ) -> Result<Self, SetupError> {
        Ok(Self::start(job_id, TrackerDeps::http(config)?, listener))
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> TrackerState {
        *self.state.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == TrackerState::Terminated
    }

    /// The most recently applied snapshot, if any.
    pub fn snapshot(&self) -> Option<StatusSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch the displayed snapshot.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Watch the session state.
    pub fn subscribe_state(&self) -> watch::Receiver<TrackerState> {
        self.state.subscribe()
    }

    /// Subscribe to tracker lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }

    /// Stop observing without firing any terminal callback.
    ///
    /// Stops the poll timer and closes the push channel before
    /// returning. A no-op once the session has terminated.
    pub fn cancel(&self) {
        if self.latch.trip() {
            tracing::info!(job_id = %self.job_id, "Cancelling job tracker");
            set_state(&self.state, TrackerState::Terminated);
        }
        self.cancel.cancel();
    }

    /// Wait for the session to end.
    pub async fn wait(mut self) -> TrackerOutcome {
        let Some(task) = self.task.take() else {
            return TrackerOutcome::Cancelled;
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "Job tracker task failed");
                TrackerOutcome::Cancelled
            }
        }
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Move to `next` unless the session already terminated.
fn set_state(state: &watch::Sender<TrackerState>, next: TrackerState) -> bool {
    state.send_if_modified(|current| {
        if *current == TrackerState::Terminated || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session<L> {
    job_id: JobId,
    subscriber: StreamSubscriber,
    poller: Poller,
    listener: L,
    snapshot_tx: watch::Sender<Option<StatusSnapshot>>,
    state: Arc<watch::Sender<TrackerState>>,
    event_tx: broadcast::Sender<TrackerEvent>,
    cancel: CancellationToken,
    latch: Arc<TerminalLatch>,
}

/// What applying one snapshot means for the session.
enum Step {
    Continue,
    Finish(TrackerOutcome),
}

impl<L: TrackerListener> Session<L> {
    async fn run(mut self) -> TrackerOutcome {
        let (mut strategy, mut deliveries) = self.open_stream();

        let outcome = loop {
            let delivery = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break TrackerOutcome::Cancelled,
                delivery = deliveries.recv() => delivery,
            };

            match delivery {
                Some(Delivery::Snapshot(snapshot)) => {
                    if let Step::Finish(outcome) = self.apply(snapshot) {
                        break outcome;
                    }
                }
                Some(Delivery::ChannelFailure(error)) => {
                    strategy.close();
                    (strategy, deliveries) = self.start_polling(&error.to_string());
                }
                Some(Delivery::FetchError(error)) => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        error = %error,
                        "Status poll failed, retrying on next tick",
                    );
                    if !self.latch.is_tripped() {
                        self.listener.on_fetch_error(&error);
                    }
                }
                None => match strategy.kind() {
                    StrategyKind::Stream => {
                        strategy.close();
                        (strategy, deliveries) = self.start_polling("event stream task ended");
                    }
                    StrategyKind::Poll => {
                        tracing::error!(job_id = %self.job_id, "Polling task ended unexpectedly");
                        break TrackerOutcome::Cancelled;
                    }
                },
            }
        };

        strategy.close();
        drop(deliveries);
        set_state(&self.state, TrackerState::Terminated);
        self.finish(outcome)
    }

    /// Open the push channel, or go straight to polling if it cannot
    /// even be opened.
    fn open_stream(&mut self) -> (ActiveStrategy, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        match self
            .subscriber
            .open(&self.job_id, tx, self.cancel.child_token())
        {
            Ok(handle) => {
                set_state(&self.state, TrackerState::StreamActive);
                tracing::info!(job_id = %self.job_id, "Observing job via event stream");
                self.emit(TrackerEvent::StreamOpened {
                    job_id: self.job_id.clone(),
                });
                (ActiveStrategy::Stream(handle), rx)
            }
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Event stream unavailable");
                self.start_polling(&e.to_string())
            }
        }
    }

    fn start_polling(&mut self, reason: &str) -> (ActiveStrategy, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        let handle = self
            .poller
            .start(&self.job_id, tx, self.cancel.child_token());

        set_state(&self.state, TrackerState::Polling);
        tracing::info!(
            job_id = %self.job_id,
            reason,
            interval_ms = self.poller.interval().as_millis() as u64,
            "Falling back to polling",
        );
        self.emit(TrackerEvent::FellBackToPolling {
            job_id: self.job_id.clone(),
            reason: reason.to_string(),
        });
        (ActiveStrategy::Poll(handle), rx)
    }

    /// Replace the displayed snapshot and decide whether the session
    /// is over.
    fn apply(&mut self, snapshot: StatusSnapshot) -> Step {
        if self.latch.is_tripped() {
            // Cancelled between deliveries.
            return Step::Finish(TrackerOutcome::Cancelled);
        }

        tracing::debug!(
            job_id = %self.job_id,
            status = %snapshot.status,
            progress = snapshot.progress,
            "Applying status snapshot",
        );

        self.snapshot_tx.send_replace(Some(snapshot.clone()));
        if self.latch.is_tripped() {
            return Step::Finish(TrackerOutcome::Cancelled);
        }
        self.listener.on_snapshot(&snapshot);
        self.emit(TrackerEvent::SnapshotApplied {
            job_id: self.job_id.clone(),
            status: snapshot.status,
            progress: snapshot.progress,
        });

        if !snapshot.is_terminal() {
            return Step::Continue;
        }
        if !self.latch.trip() {
            return Step::Finish(TrackerOutcome::Cancelled);
        }

        match snapshot.status {
            JobStatus::Done => Step::Finish(TrackerOutcome::Completed {
                result_url: snapshot.result_url,
            }),
            _ => Step::Finish(TrackerOutcome::Failed {
                error: snapshot.error,
            }),
        }
    }

    /// Fire the terminal callback for `outcome`. Strategies are already
    /// closed when this runs.
    fn finish(mut self, outcome: TrackerOutcome) -> TrackerOutcome {
        match &outcome {
            TrackerOutcome::Completed { result_url } => {
                if result_url.is_none() {
                    tracing::warn!(job_id = %self.job_id, "Job completed without a result URL");
                }
                tracing::info!(job_id = %self.job_id, result_url = ?result_url, "Job completed");
                self.emit(TrackerEvent::Completed {
                    job_id: self.job_id.clone(),
                    result_url: result_url.clone(),
                });
                self.listener.on_complete(result_url.clone());
            }
            TrackerOutcome::Failed { error } => {
                tracing::info!(job_id = %self.job_id, error = ?error, "Job failed");
                self.emit(TrackerEvent::Failed {
                    job_id: self.job_id.clone(),
                    error: error.clone(),
                });
                self.listener.on_failure(error.clone());
            }
            TrackerOutcome::Cancelled => {
                self.latch.trip();
                tracing::info!(job_id = %self.job_id, "Job tracking cancelled");
                self.emit(TrackerEvent::Cancelled {
                    job_id: self.job_id.clone(),
                });
            }
        }
        outcome
    }

    fn emit(&self, event: TrackerEvent) {
        let _ = self.event_tx.send(event);
    }
}
