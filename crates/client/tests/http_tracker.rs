//! End-to-end tracking over HTTP against a mock generation server.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use audiogen_client::config::TrackerConfig;
use audiogen_client::tracker::{JobTracker, NoopListener, TrackerOutcome};

fn config(server: &MockServer) -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(20),
        ..TrackerConfig::with_api_url(server.uri())
    }
}

#[tokio::test]
async fn closed_event_stream_is_finished_by_polling() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: progress\n",
        "data: {\"job_id\":\"abc\",\"status\":\"queued\",\"progress\":0,\"message\":\"\",\"result_url\":null,\"error\":null}\n\n",
        "event: progress\n",
        "data: {\"job_id\":\"abc\",\"status\":\"running\",\"progress\":30,\"message\":\"Generating\",\"result_url\":null,\"error\":null}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/jobs/abc/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "abc",
            "status": "done",
            "progress": 100,
            "message": "Done",
            "result_url": "/api/files/abc.wav",
            "error": null,
            "params": {"prompt": "lofi beat", "duration": 10},
            "created_at": "2026-10-18T09:00:00.123456",
            "started_at": "2026-10-18T09:00:01",
            "completed_at": "2026-10-18T09:00:12"
        })))
        .mount(&server)
        .await;

    let tracker = JobTracker::start_http("abc", config(&server), NoopListener).unwrap();
    let snapshots = tracker.subscribe_snapshots();
    let outcome = tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .expect("tracker should finish");

    assert_eq!(
        outcome,
        TrackerOutcome::Completed {
            result_url: Some("/api/files/abc.wav".into())
        }
    );
    let last = snapshots.borrow().clone().expect("snapshot applied");
    assert!(last.timestamps_ordered());
    assert_eq!(last.params.map(|p| p.prompt), Some("lofi beat".to_string()));
}

#[tokio::test]
async fn unknown_job_stream_falls_back_to_polling_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/gone/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("event: error\ndata: {\"error\": \"Job not found\"}\n\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "gone",
            "status": "error",
            "progress": 0,
            "message": "",
            "result_url": null,
            "error": "Job not found"
        })))
        .mount(&server)
        .await;

    let tracker = JobTracker::start_http("gone", config(&server), NoopListener).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .expect("tracker should finish");

    assert_matches!(outcome, TrackerOutcome::Failed { error: Some(e) } if e == "Job not found");
}

#[tokio::test]
async fn invalid_api_url_is_a_setup_error() {
    let config = TrackerConfig::with_api_url("ftp://example.com");
    assert!(JobTracker::start_http("abc", config, NoopListener).is_err());
}

#[tokio::test]
async fn unanswered_event_stream_falls_back_to_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/abc/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_delay(Duration::from_secs(600)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/jobs/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "abc",
            "status": "done",
            "progress": 100,
            "message": "Done",
            "result_url": "/api/files/abc.wav",
            "error": null
        })))
        .mount(&server)
        .await;

    let config = TrackerConfig {
        stream_connect_timeout: Duration::from_millis(200),
        ..config(&server)
    };
    let tracker = JobTracker::start_http("abc", config, NoopListener).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), tracker.wait())
        .await
        .expect("tracker should fall back and finish");

    assert_eq!(
        outcome,
        TrackerOutcome::Completed {
            result_url: Some("/api/files/abc.wav".into())
        }
    );
}

