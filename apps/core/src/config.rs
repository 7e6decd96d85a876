//! Runtime configuration for the completion client and the analysis pipeline.
//!
//! Values come from the environment (`TEXTLENS_*` variables, `.env` supported
//! via `dotenv` in the binary) with serde-style defaults for everything.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::error::AppError;

/// Configuration for the completion client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompletionConfig {
    /// Base URL of the text-generation backend.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Optional bearer token sent with every request.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Candidate models in priority order; the client rotates through this
    /// list on model-specific failures.
    #[serde(default = "default_models")]
    #[validate(length(min = 1))]
    pub models: Vec<String>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempt ceiling per logical call (first try included).
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1))]
    pub max_retries: u32,
    /// Maximum number of model rotations per logical call.
    #[serde(default = "default_max_model_rotations")]
    pub max_model_rotations: u32,
    /// Self-imposed rate limit: at most this many requests per window.
    #[serde(default = "default_throttle_max_requests")]
    pub throttle_max_requests: usize,
    /// Self-imposed rate limit window in seconds.
    #[serde(default = "default_throttle_window_secs")]
    pub throttle_window_secs: u64,
    /// Consecutive terminal failures before a proactive cooldown kicks in.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Proactive cooldown length in seconds.
    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,
    /// Base delay for exponential backoff, in milliseconds (doubles per
    /// attempt, capped).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8080".to_string()
}
fn default_models() -> Vec<String> {
    vec![
        "qwen2.5-7b-instruct".to_string(),
        "llama-3.2-3b-instruct".to_string(),
    ]
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_model_rotations() -> u32 {
    2
}
fn default_throttle_max_requests() -> usize {
    5
}
fn default_throttle_window_secs() -> u64 {
    5
}
fn default_error_threshold() -> u32 {
    5
}
fn default_error_cooldown_secs() -> u64 {
    60
}
fn default_backoff_base_ms() -> u64 {
    500
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            models: default_models(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_model_rotations: default_max_model_rotations(),
            throttle_max_requests: default_throttle_max_requests(),
            throttle_window_secs: default_throttle_window_secs(),
            error_threshold: default_error_threshold(),
            error_cooldown_secs: default_error_cooldown_secs(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl CompletionConfig {
    /// Build a configuration from `TEXTLENS_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Ok(endpoint) = env::var("TEXTLENS_ENDPOINT") {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Ok(key) = env::var("TEXTLENS_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(models) = env::var("TEXTLENS_MODELS") {
            let parsed: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.models = parsed;
            }
        }
        if let Ok(v) = env::var("TEXTLENS_TIMEOUT_SECS") {
            config.timeout_secs = v
                .parse()
                .map_err(|e| AppError::Config(format!("TEXTLENS_TIMEOUT_SECS: {}", e)))?;
        }
        if let Ok(v) = env::var("TEXTLENS_MAX_RETRIES") {
            config.max_retries = v
                .parse()
                .map_err(|e| AppError::Config(format!("TEXTLENS_MAX_RETRIES: {}", e)))?;
        }
        if let Ok(v) = env::var("TEXTLENS_MAX_MODEL_ROTATIONS") {
            config.max_model_rotations = v
                .parse()
                .map_err(|e| AppError::Config(format!("TEXTLENS_MAX_MODEL_ROTATIONS: {}", e)))?;
        }

        config.check()?;
        Ok(config)
    }

    /// Validate the configuration, including that the endpoint parses as a URL.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        Url::parse(&self.endpoint)
            .map_err(|e| AppError::Config(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_secs(self.throttle_window_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Tuning knobs for the analysis pipeline. All values are heuristics, not
/// correctness constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Maximum characters per chunk sent to the backend.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Overlap between adjacent chunks, in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Inputs at or below this size are summarized in one call.
    #[serde(default = "default_direct_summary_threshold")]
    pub direct_summary_threshold: usize,
    /// Total content above this size switches the orchestrator to
    /// per-source (distributed) processing.
    #[serde(default = "default_distributed_threshold")]
    pub distributed_threshold: usize,
    /// Inputs above this size are chunked before segmentation.
    #[serde(default = "default_segment_chunk_threshold")]
    pub segment_chunk_threshold: usize,
    /// Maximum topics in the final ranked list.
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
    /// Maximum keywords surfaced on the result.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

fn default_max_chunk_size() -> usize {
    12_000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_direct_summary_threshold() -> usize {
    12_000
}
fn default_distributed_threshold() -> usize {
    60_000
}
fn default_segment_chunk_threshold() -> usize {
    30_000
}
fn default_max_topics() -> usize {
    10
}
fn default_max_keywords() -> usize {
    10
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            direct_summary_threshold: default_direct_summary_threshold(),
            distributed_threshold: default_distributed_threshold(),
            segment_chunk_threshold: default_segment_chunk_threshold(),
            max_topics: default_max_topics(),
            max_keywords: default_max_keywords(),
        }
    }
}
