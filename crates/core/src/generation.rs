//! Generation request and response shapes.
//!
//! These mirror the server's `/api/generate` and `/api/models`
//! contracts. The request is echoed back inside every full status
//! snapshot as `params`.

use serde::{Deserialize, Serialize};

use crate::types::JobId;

/// Default model used when none is specified.
pub const DEFAULT_MODEL: &str = "musicgen-small";

/// Parameters for one audio generation.
///
/// Unknown fields are ignored and missing ones take the server's
/// defaults, so an echoed `params` object from a newer server still
/// decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Clip length in seconds.
    pub duration: u32,
    /// `None` or `-1` lets the server pick a random seed.
    pub seed: Option<i64>,
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    /// Classifier-free guidance coefficient.
    pub cfg_coef: f64,
    pub stereo: bool,
    pub sample_rate: u32,
    /// Output container, `wav` or `mp3`.
    pub format: String,
}

impl Default for GenerateRequest {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            prompt: String::new(),
            duration: 10,
            seed: None,
            temperature: 1.0,
            top_k: 250,
            top_p: 0.0,
            cfg_coef: 3.0,
            stereo: true,
            sample_rate: 32_000,
            format: "wav".to_string(),
        }
    }
}

impl GenerateRequest {
    /// Request with server defaults and the given prompt.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Response from `POST /api/generate` once the job is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub job_id: JobId,
    pub status: String,
    /// Rough server estimate of total generation time.
    pub estimated_seconds: u64,
    /// Submissions left in the caller's hourly rate-limit window.
    pub rate_limit_remaining: u32,
}

/// One entry of `GET /api/models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub supports_stereo: bool,
    pub sample_rate: u32,
    pub requires_gpu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server() {
        let req = GenerateRequest::with_prompt("lofi beat");
        assert_eq!(req.model, "musicgen-small");
        assert_eq!(req.prompt, "lofi beat");
        assert_eq!(req.duration, 10);
        assert_eq!(req.top_k, 250);
        assert_eq!(req.sample_rate, 32_000);
        assert!(req.stereo);
    }

    #[test]
    fn partial_params_fill_defaults() {
        let req: GenerateRequest =
            serde_json::from_str(r#"{"prompt":"rain","duration":5,"extra":1}"#).unwrap();
        assert_eq!(req.prompt, "rain");
        assert_eq!(req.duration, 5);
        assert_eq!(req.format, "wav");
    }

    #[test]
    fn model_info_reads_type_field() {
        let json = r#"{"id":"musicgen-small","name":"MusicGen Small","type":"music",
            "description":"300M","supports_stereo":true,"sample_rate":32000,"requires_gpu":false}"#;
        let info: ModelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.kind, "music");
        assert!(!info.requires_gpu);
    }
}
