use clap::{Args, Parser, Subcommand};

use audiogen_client::config::TrackerConfig;
use audiogen_core::error::CoreError;
use audiogen_core::generation::{GenerateRequest, DEFAULT_MODEL};

#[derive(Parser, Debug, Clone)]
#[command(name = "audiogen", author, version, about, long_about = None)]
pub struct Cli {
    /// Generation server base URL
    #[arg(long, global = true, env = "AUDIOGEN_API_URL")]
    pub api_url: Option<String>,

    /// Skip the event stream and poll from the start
    #[arg(long, global = true)]
    pub no_stream: bool,

    /// Poll interval in milliseconds once the tracker is polling
    #[arg(long, global = true, env = "AUDIOGEN_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Submit a generation and track it until it finishes
    Generate(GenerateArgs),

    /// Track an existing job until it finishes
    Watch {
        /// Job ID returned by `generate`
        job_id: String,
    },

    /// List the models the server can run
    Models {
        /// Print the raw model list as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Text description of the audio to generate
    #[arg(long, short)]
    pub prompt: String,

    /// Model ID
    #[arg(long, short, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Clip length in seconds
    #[arg(long, short, default_value = "10")]
    pub duration: u32,

    /// Fixed seed for reproducible output
    #[arg(long)]
    pub seed: Option<i64>,

    /// Sampling temperature
    #[arg(long, default_value = "1.0")]
    pub temperature: f64,

    /// Output format (wav or mp3)
    #[arg(long, default_value = "wav")]
    pub format: String,

    /// Generate a mono clip
    #[arg(long)]
    pub mono: bool,
}

impl GenerateArgs {
    /// Build the request body, leaving unexposed knobs at server defaults.
    pub fn to_request(&self) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            duration: self.duration,
            seed: self.seed,
            temperature: self.temperature,
            format: self.format.clone(),
            stereo: !self.mono,
            ..Default::default()
        }
    }
}

impl Cli {
    /// Environment-derived tracker config with command-line overrides
    /// applied on top.
    pub fn tracker_config(&self) -> Result<TrackerConfig, CoreError> {
        let mut config = TrackerConfig::from_env()?;
        self.apply_overrides(&mut config)?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut TrackerConfig) -> Result<(), CoreError> {
        if let Some(url) = &self.api_url {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = self.poll_interval_ms {
            if ms == 0 {
                return Err(CoreError::Validation(
                    "poll interval must be greater than zero".into(),
                ));
            }
            config.poll_interval = std::time::Duration::from_millis(ms);
        }
        if self.no_stream {
            config.stream_enabled = false;
        }
        Ok(())
    }
}
