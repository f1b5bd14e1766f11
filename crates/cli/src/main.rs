//! `audiogen` -- submit audio generations and follow them to the end.
//!
//! # Environment variables
//!
//! | Variable                        | Default                 | Description                              |
//! |---------------------------------|-------------------------|------------------------------------------|
//! | `AUDIOGEN_API_URL`              | `http://localhost:8000` | Generation server base URL               |
//! | `AUDIOGEN_POLL_INTERVAL_MS`     | `1000`                  | Poll cadence after stream fallback       |
//! | `AUDIOGEN_REQUEST_TIMEOUT_SECS` | `30`                    | Timeout for single-shot REST calls       |
//! | `AUDIOGEN_DISABLE_STREAM`       | `false`                 | Poll from the start                      |
//! | `LOG_FORMAT`                    | --                      | `json` for JSON log lines                |
//! | `RUST_LOG`                      | see below               | Log filter                               |

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiogen_cli::args::Cli;
use audiogen_cli::run::{run, EXIT_SETUP};

const DEFAULT_LOG_FILTER: &str = "audiogen=info,audiogen_cli=info,audiogen_client=info";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "audiogen failed");
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
