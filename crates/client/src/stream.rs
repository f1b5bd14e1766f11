//! Event stream subscriber for one job's push channel.
//!
//! [`EventSource`] opens the raw channel. [`SseEventSource`] is the
//! HTTP implementation, reading `GET /api/jobs/{id}/events` as
//! `text/event-stream`. [`StreamSubscriber`] runs one channel per job
//! in a background task. It forwards parsed snapshots as
//! [`Delivery::Snapshot`], discards malformed payloads, and reports
//! exactly one [`Delivery::ChannelFailure`] when the channel dies.
//!
//! The subscriber never reconnects. A dead channel means push is
//! unusable for the session and the tracker falls back to polling.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{TrackerConfig, DEFAULT_STREAM_CONNECT_TIMEOUT};
use crate::delivery::Delivery;
use crate::sse::{parse_snapshot, SseDecoder, SseEvent};

/// TCP connect timeout for the event stream client. The stream itself
/// has no overall timeout; see [`TrackerConfig::stream_idle_timeout`].
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A live push channel yielding decoded events until it fails or ends.
pub type EventStream = BoxStream<'static, Result<SseEvent, ChannelError>>;

/// Opens the push channel for a job.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self, job_id: &str) -> Result<EventStream, ChannelError>;
}

/// Reasons the push channel is unusable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    /// Push delivery is turned off for this client.
    #[error("Event stream disabled")]
    Disabled,

    /// The channel could not be established.
    #[error("Connection error: {0}")]
    Connect(String),

    /// The server answered with a non-2xx status.
    #[error("Event stream rejected with status {status}")]
    Status { status: u16 },

    /// The response was not `text/event-stream`.
    #[error("Not an event stream (content-type: {0})")]
    NotEventStream(String),

    /// Reading the body failed mid-stream.
    #[error("Stream read error: {0}")]
    Read(String),

    /// The stream sent nothing, not even a keepalive, for this long.
    #[error("Event stream silent for {0:?}")]
    Idle(Duration),

    /// The server closed the stream.
    #[error("Event stream closed by server")]
    Closed,
}

// ---------------------------------------------------------------------------
// SseEventSource
// ---------------------------------------------------------------------------

/// HTTP Server-Sent Events channel to the generation server.
#[derive(Debug, Clone)]
pub struct SseEventSource {
    client: reqwest::Client,
    api_url: String,
    idle_timeout: Option<Duration>,
}

impl SseEventSource {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: impl Into<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Self::with_client(client, api_url))
    }

    /// Source for `config.api_url` that drops streams silent for longer
    /// than `config.stream_idle_timeout`.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, ChannelError> {
        Ok(Self::new(config.api_url.clone())?.with_idle_timeout(config.stream_idle_timeout))
    }

    /// Fail an open stream with [`ChannelError::Idle`] when no bytes
    /// arrive for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Reuse an existing client. It must not carry a total request
    /// timeout, or long-lived streams will be cut off.
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            idle_timeout: None,
        }
    }

    fn events_url(&self, job_id: &str) -> String {
        format!("{}/api/jobs/{}/events", self.api_url, job_id)
    }
}

#[async_trait]
impl EventSource for SseEventSource {
    async fn connect(&self, job_id: &str) -> Result<EventStream, ChannelError> {
        let url = self.events_url(job_id);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ChannelError::Connect(format!("Failed to open {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(ChannelError::NotEventStream(content_type));
        }

        Ok(decode_body(response.bytes_stream().boxed(), self.idle_timeout).boxed())
    }
}

/// Adapt a chunked body into decoded events.
///
/// A read error ends the stream after yielding one
/// [`ChannelError::Read`]; events completed before it are still
/// yielded first. With `idle` set, a gap between chunks longer than
/// `idle` ends it the same way with [`ChannelError::Idle`].
fn decode_body<S, B, E>(
    bytes: S,
    idle: Option<Duration>,
) -> impl Stream<Item = Result<SseEvent, ChannelError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = BodyState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        failed: false,
        idle,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.failed {
                return None;
            }
            let next = match state.idle {
                Some(limit) => match tokio::time::timeout(limit, state.bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        state.failed = true;
                        return Some((Err(ChannelError::Idle(limit)), state));
                    }
                },
                None => state.bytes.next().await,
            };
            match next {
                Some(Ok(chunk)) => {
                    let events = state.decoder.feed(chunk.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.failed = true;
                    return Some((Err(ChannelError::Read(e.to_string())), state));
                }
                None => return None,
            }
        }
    })
}

struct BodyState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    failed: bool,
    idle: Option<Duration>,
}

// ---------------------------------------------------------------------------
// StreamSubscriber
// ---------------------------------------------------------------------------

/// Opens per-job push channels on top of an [`EventSource`].
#[derive(Clone)]
pub struct StreamSubscriber {
    source: Arc<dyn EventSource>,
    enabled: bool,
    connect_timeout: Duration,
}

/// Handle to one open push channel.
///
/// Dropping the handle closes the channel.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
}

impl StreamSubscriber {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            source,
            enabled: true,
            connect_timeout: DEFAULT_STREAM_CONNECT_TIMEOUT,
        }
    }

    /// A subscriber whose `open` always fails with
    /// [`ChannelError::Disabled`].
    pub fn disabled(source: Arc<dyn EventSource>) -> Self {
        Self {
            source,
            enabled: false,
            connect_timeout: DEFAULT_STREAM_CONNECT_TIMEOUT,
        }
    }

    /// Report [`ChannelError::Connect`] if the source has not produced a
    /// stream within `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Open the push channel for `job_id`.
    ///
    /// Returns as soon as the channel task is spawned; connection
    /// happens in the background. Deliveries go to `deliveries` until
    /// the channel fails or `cancel` (or the returned handle) closes
    /// it. Must be called within a tokio runtime.
    pub fn open(
        &self,
        job_id: &str,
        deliveries: mpsc::Sender<Delivery>,
        cancel: CancellationToken,
    ) -> Result<StreamHandle, ChannelError> {
        if !self.enabled {
            return Err(ChannelError::Disabled);
        }

        let source = Arc::clone(&self.source);
        let job_id = job_id.to_string();
        let connect_timeout = self.connect_timeout;
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            run_stream(source, job_id, connect_timeout, deliveries, task_cancel).await;
        });

        Ok(StreamHandle { cancel })
    }
}

impl StreamHandle {
    /// Close the channel and release its resources. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drive one push channel: connect, forward snapshots, and report a
/// single failure when the channel ends for any reason other than an
/// explicit close.
async fn run_stream(
    source: Arc<dyn EventSource>,
    job_id: String,
    connect_timeout: Duration,
    deliveries: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = tokio::time::timeout(connect_timeout, source.connect(&job_id)) => {
            result.unwrap_or_else(|_| {
                Err(ChannelError::Connect(format!(
                    "no response within {connect_timeout:?}"
                )))
            })
        }
    };

    let mut stream = match connected {
        Ok(stream) => {
            tracing::info!(job_id = %job_id, "Event stream connected");
            stream
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Event stream failed to open");
            report_failure(&deliveries, &cancel, e).await;
            return;
        }
    };

    let mut discarded = 0u64;
    let failure = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, discarded, "Event stream closed");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                if !event.carries_snapshot() {
                    tracing::trace!(
                    job_id = %job_id,
                    event = %event.event,
                    event_id = ?event.id,
                    retry_ms = ?event.retry,
                    "Ignoring stream event type",
                );
                    continue;
                }
                match parse_snapshot(&event.data) {
                    Ok(snapshot) => {
                        if deliveries.send(Delivery::Snapshot(snapshot)).await.is_err() {
                            // Tracker stopped listening.
                            return;
                        }
                    }
                    Err(e) => {
                        discarded += 1;
                        tracing::debug!(
                            job_id = %job_id,
                            error = %e,
                            event_id = ?event.id,
                            raw_message = %event.data,
                            "Discarding unparseable stream payload",
                        );
                    }
                }
            }
            Some(Err(e)) => break e,
            None => break ChannelError::Closed,
        }
    };

    tracing::warn!(job_id = %job_id, error = %failure, discarded, "Event stream failed");
    report_failure(&deliveries, &cancel, failure).await;
}

async fn report_failure(
    deliveries: &mpsc::Sender<Delivery>,
    cancel: &CancellationToken,
    error: ChannelError,
) {
    if cancel.is_cancelled() {
        return;
    }
    let _ = deliveries.send(Delivery::ChannelFailure(error)).await;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use audiogen_core::status::JobStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn sse_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/event-stream")
    }

    #[tokio::test]
    async fn decode_body_yields_events_then_read_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: one\n\ndata: tw".to_vec()),
            Ok(b"o\n\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: never\n\n".to_vec()),
        ];
        let events: Vec<_> = decode_body(futures::stream::iter(chunks), None).collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap().data, "one");
        assert_eq!(events[1].as_ref().unwrap().data, "two");
        assert_matches!(&events[2], Err(ChannelError::Read(msg)) if msg == "connection reset");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_body_fails_with_idle() {
        let chunks = futures::stream::iter(vec![Ok::<_, String>(b"data: one\n\n".to_vec())])
            .chain(futures::stream::pending());
        let idle = Duration::from_secs(30);
        let events: Vec<_> = decode_body(chunks, Some(idle)).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, "one");
        assert_matches!(&events[1], Err(ChannelError::Idle(limit)) if *limit == idle);
    }

    /// Accepts the connection but never produces a stream.
    struct UnansweredSource;

    #[async_trait]
    impl EventSource for UnansweredSource {
        async fn connect(&self, _job_id: &str) -> Result<EventStream, ChannelError> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_connect_is_a_channel_failure() {
        let subscriber = StreamSubscriber::new(Arc::new(UnansweredSource))
            .with_connect_timeout(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::channel(1);
        let start = tokio::time::Instant::now();
        let _handle = subscriber.open("abc", tx, CancellationToken::new()).unwrap();

        assert_matches!(rx.recv().await, Some(Delivery::ChannelFailure(ChannelError::Connect(_))));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn sse_source_reads_event_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/abc/events"))
            .and(header("accept", "text/event-stream"))
            .respond_with(sse_response(
                "event: progress\ndata: {\"job_id\":\"abc\",\"status\":\"running\",\"progress\":30}\n\n",
            ))
            .mount(&server)
            .await;

        let source = SseEventSource::new(server.uri()).unwrap();
        let mut stream = source.connect("abc").await.expect("stream should open");

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.event, "progress");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn sse_source_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/nope/events"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = SseEventSource::new(server.uri()).unwrap();
        assert_matches!(
            source.connect("nope").await.map(|_| ()),
            Err(ChannelError::Status { status: 404 })
        );
    }

    #[tokio::test]
    async fn sse_source_rejects_plain_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/abc/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let source = SseEventSource::new(server.uri()).unwrap();
        assert_matches!(
            source.connect("abc").await.map(|_| ()),
            Err(ChannelError::NotEventStream(_))
        );
    }

    #[tokio::test]
    async fn subscriber_forwards_snapshots_and_reports_one_failure() {
        let server = MockServer::start().await;
        let body = concat!(
            ": keepalive\n\n",
            "data:\n\n",
            "event: progress\ndata: not json\n\n",
            "event: progress\ndata: {\"job_id\":\"abc\",\"status\":\"queued\",\"progress\":0}\n\n",
            "event: error\ndata: {\"error\":\"Job not found\"}\n\n",
            "data: {\"job_id\":\"abc\",\"status\":\"running\",\"progress\":45}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/api/jobs/abc/events"))
            .respond_with(sse_response(body))
            .mount(&server)
            .await;

        let source: Arc<dyn EventSource> = Arc::new(SseEventSource::new(server.uri()).unwrap());
        let subscriber = StreamSubscriber::new(source);
        let (tx, mut rx) = mpsc::channel(8);
        let _handle = subscriber
            .open("abc", tx, CancellationToken::new())
            .expect("open should succeed");

        assert_matches!(rx.recv().await, Some(Delivery::Snapshot(s)) if s.status == JobStatus::Queued);
        assert_matches!(rx.recv().await, Some(Delivery::Snapshot(s)) if s.progress == 45);
        // The server ended the body, which counts as a channel failure.
        assert_matches!(rx.recv().await, Some(Delivery::ChannelFailure(ChannelError::Closed)));
        // Exactly one failure, then the task drops its sender.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn disabled_subscriber_fails_to_open() {
        let source: Arc<dyn EventSource> =
            Arc::new(SseEventSource::new("http://127.0.0.1:9").unwrap());
        let subscriber = StreamSubscriber::disabled(source);
        let (tx, _rx) = mpsc::channel(1);

        assert_matches!(
            subscriber.open("abc", tx, CancellationToken::new()),
            Err(ChannelError::Disabled)
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silences_the_channel() {
        let source: Arc<dyn EventSource> =
            Arc::new(SseEventSource::new("http://127.0.0.1:9").unwrap());
        let subscriber = StreamSubscriber::new(source);
        let (tx, mut rx) = mpsc::channel(1);

        let handle = subscriber.open("abc", tx, CancellationToken::new()).unwrap();
        handle.close();
        handle.close();
        assert!(handle.is_closed());

        // Closed before the connect attempt could report anything.
        assert!(rx.recv().await.is_none());
    }
}
