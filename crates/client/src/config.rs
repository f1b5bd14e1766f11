use std::time::Duration;

use audiogen_core::error::CoreError;

/// Default server base URL for local development.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default cadence of the polling fallback.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default timeout for single-shot REST calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for the event stream's response headers.
pub const DEFAULT_STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default silence allowed on an open event stream. The server sends a
/// keepalive comment about every 15 seconds.
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Tracker and HTTP client configuration.
///
/// All fields have defaults suitable for a local server. Override via
/// environment variables with [`TrackerConfig::from_env`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Server base URL without a trailing slash.
    pub api_url: String,
    /// Interval between status fetches once the tracker is polling.
    pub poll_interval: Duration,
    /// Timeout for status, submit and model-list requests. Never
    /// applied to the event stream.
    pub request_timeout: Duration,
    /// When `false` the push channel is treated as unavailable and the
    /// tracker polls from the start.
    pub stream_enabled: bool,
    /// How long the event stream may take to answer with headers before
    /// it counts as a channel failure.
    pub stream_connect_timeout: Duration,
    /// How long an open event stream may go without sending any bytes,
    /// keepalives included, before it counts as a channel failure.
    pub stream_idle_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_enabled: true,
            stream_connect_timeout: DEFAULT_STREAM_CONNECT_TIMEOUT,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
        }
    }
}

impl TrackerConfig {
    /// Config pointing at `api_url` with every other field defaulted.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: normalize_url(&api_url.into()),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                                | Default                 |
    /// |----------------------------------------|-------------------------|
    /// | `AUDIOGEN_API_URL`                     | `http://localhost:8000` |
    /// | `AUDIOGEN_POLL_INTERVAL_MS`            | `1000`                  |
    /// | `AUDIOGEN_REQUEST_TIMEOUT_SECS`        | `30`                    |
    /// | `AUDIOGEN_DISABLE_STREAM`              | `false`                 |
    /// | `AUDIOGEN_STREAM_CONNECT_TIMEOUT_SECS` | `10`                    |
    /// | `AUDIOGEN_STREAM_IDLE_TIMEOUT_SECS`    | `45`                    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("AUDIOGEN_API_URL")
            .map(|v| normalize_url(&v))
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_url);

        let poll_interval = match lookup("AUDIOGEN_POLL_INTERVAL_MS") {
            Some(raw) => {
                let ms = parse_u64("AUDIOGEN_POLL_INTERVAL_MS", &raw)?;
                if ms == 0 {
                    return Err(CoreError::Validation(
                        "AUDIOGEN_POLL_INTERVAL_MS must be greater than zero".into(),
                    ));
                }
                Duration::from_millis(ms)
            }
            None => defaults.poll_interval,
        };

        let request_timeout = match lookup("AUDIOGEN_REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_u64("AUDIOGEN_REQUEST_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        let stream_enabled = match lookup("AUDIOGEN_DISABLE_STREAM") {
            Some(raw) => !parse_bool("AUDIOGEN_DISABLE_STREAM", &raw)?,
            None => defaults.stream_enabled,
        };

        let stream_connect_timeout = match lookup("AUDIOGEN_STREAM_CONNECT_TIMEOUT_SECS") {
            Some(raw) => positive_secs("AUDIOGEN_STREAM_CONNECT_TIMEOUT_SECS", &raw)?,
            None => defaults.stream_connect_timeout,
        };

        let stream_idle_timeout = match lookup("AUDIOGEN_STREAM_IDLE_TIMEOUT_SECS") {
            Some(raw) => positive_secs("AUDIOGEN_STREAM_IDLE_TIMEOUT_SECS", &raw)?,
            None => defaults.stream_idle_timeout,
        };

        Ok(Self {
            api_url,
            poll_interval,
            request_timeout,
            stream_enabled,
            stream_connect_timeout,
            stream_idle_timeout,
        })
    }
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} must be a valid u64, got {raw:?}")))
}

fn positive_secs(key: &str, raw: &str) -> Result<Duration, CoreError> {
    match parse_u64(key, raw)? {
        0 => Err(CoreError::Validation(format!("{key} must be greater than zero"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}
