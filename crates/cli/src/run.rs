//! Subcommand execution.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;

use audiogen_client::api::StatusApi;
use audiogen_client::config::TrackerConfig;
use audiogen_client::stream::SseEventSource;
use audiogen_client::tracker::{JobTracker, TrackerDeps, TrackerOutcome, TrackerState};
use audiogen_core::generation::GenerateRequest;
use audiogen_events::{EventBus, HistoryEntry};

use crate::args::{Cli, Command};
use crate::display::ProgressPrinter;

pub const EXIT_COMPLETED: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
pub const EXIT_CANCELLED: u8 = 2;
/// Used by the binary when [`run`] returns an error.
pub const EXIT_SETUP: u8 = 3;

pub fn exit_code(outcome: &TrackerOutcome) -> u8 {
    match outcome {
        TrackerOutcome::Completed { .. } => EXIT_COMPLETED,
        TrackerOutcome::Failed { .. } => EXIT_FAILED,
        TrackerOutcome::Cancelled => EXIT_CANCELLED,
    }
}

/// Execute the parsed command line, returning the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = cli.tracker_config().context("invalid configuration")?;
    let api = StatusApi::from_config(&config).context("failed to build HTTP client")?;

    tracing::info!(
        api_url = %config.api_url,
        stream_enabled = config.stream_enabled,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Starting audiogen",
    );

    match cli.command {
        Command::Models { json } => {
            let models = api.list_models().await.context("failed to list models")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                for model in &models {
                    println!("{}\t{}\t{}\t{}", model.id, model.name, model.kind, model.description);
                }
            }
            Ok(EXIT_COMPLETED)
        }
        Command::Generate(args) => {
            let request = args.to_request();
            let submitted = api
                .submit_generation(&request)
                .await
                .context("failed to submit generation")?;
            println!(
                "Queued job {} (~{}s, {} submissions left this hour)",
                submitted.job_id, submitted.estimated_seconds, submitted.rate_limit_remaining,
            );
            track(&api, config, submitted.job_id, Some(request)).await
        }
        Command::Watch { job_id } => track(&api, config, job_id, None).await,
    }
}

/// Track one job to the end, publishing a history entry when it
/// completes with a result.
async fn track(
    api: &StatusApi,
    config: TrackerConfig,
    job_id: String,
    params: Option<GenerateRequest>,
) -> anyhow::Result<u8> {
    let events = SseEventSource::from_config(&config).context("failed to build event stream client")?;
    let deps = TrackerDeps {
        fetcher: Arc::new(api.clone()),
        events: Arc::new(events),
        config,
    };

    let tracker = JobTracker::start(job_id.clone(), deps, ProgressPrinter::stdout(api.clone()));
    let mut state = tracker.subscribe_state();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job_id = %job_id, "Interrupted, stopping tracker");
            tracker.cancel();
        }
        _ = state.wait_for(|s| *s == TrackerState::Terminated) => {}
    }

    let outcome = tracker.wait().await;

    if let TrackerOutcome::Completed {
        result_url: Some(result_url),
    } = &outcome
    {
        let params = match params {
            Some(params) => Some(params),
            None => api.fetch_status(&job_id).await.ok().and_then(|s| s.params),
        };
        match params {
            Some(params) => publish_history(HistoryEntry::new(job_id.as_str(), &params, result_url.as_str())).await,
            None => tracing::debug!(job_id = %job_id, "No request parameters, history not updated"),
        }
    }

    Ok(exit_code(&outcome))
}

/// Publish `entry` on a fresh bus and wait for the logger to see it.
async fn publish_history(entry: HistoryEntry) {
    let bus = EventBus::default();
    let logger = spawn_history_logger(&bus);
    bus.publish(entry.into_event());
    drop(bus);
    let _ = logger.await;
}

/// Log every history update until the bus is dropped.
fn spawn_history_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let Some(entry) = HistoryEntry::from_event(&event) {
                tracing::info!(
                    job_id = %entry.job_id,
                    prompt = %entry.prompt,
                    model = %entry.model,
                    result_url = %entry.result_url,
                    "History updated",
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_exit_codes() {
        assert_eq!(exit_code(&TrackerOutcome::Completed { result_url: None }), 0);
        assert_eq!(exit_code(&TrackerOutcome::Failed { error: None }), 1);
        assert_eq!(exit_code(&TrackerOutcome::Cancelled), 2);
    }
}
