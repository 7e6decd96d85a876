//! The seam between the analysis pipeline and the text-generation backend.
//!
//! Pipeline stages depend only on [`TextGenerator`]; the HTTP client in
//! `client.rs` is one implementation, test mocks are another.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during completion operations.
///
/// The client resolves every failure mode into exactly one of these; callers
/// never see transport-level errors directly.
#[derive(Debug, Error, Clone)]
pub enum CompletionError {
    /// Backend- or self-imposed rate limit; retryable after the given delay.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The call did not complete within its bounded timeout. Retryable.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A 5xx from the backend. Retryable with backoff.
    #[error("transient server error (HTTP {status}): {message}")]
    TransientServer { status: u16, message: String },

    /// Model-specific failure (unavailable, overloaded, not found).
    /// Triggers model rotation rather than a plain retry.
    #[error("model '{model}' unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    /// Authentication rejected. Never retried.
    #[error("authentication failed (HTTP {status})")]
    AuthFailure { status: u16 },

    /// The backend answered but the response could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other client-side rejection from the backend. Never retried.
    #[error("backend rejected request (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Transport-level failure reaching the backend. Retryable.
    #[error("connection error: {0}")]
    Connection(String),
}

impl CompletionError {
    /// Whether the retry loop may attempt this call again on the same model.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited { .. }
                | CompletionError::Timeout(_)
                | CompletionError::TransientServer { .. }
                | CompletionError::Connection(_)
                | CompletionError::MalformedResponse(_)
        )
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Explicit model override; `None` uses the client's rotating priority
    /// list.
    pub model: Option<String>,
    /// System-level instructions passed alongside the prompt.
    pub system_prompt: Option<String>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: None,
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

impl CompletionOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// One fragment of a streamed completion. `last` is set on the final
/// fragment (or on an empty terminator when the stream ends).
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub text: String,
    pub last: bool,
}

/// Defines the public interface to a text-generation backend.
///
/// This trait abstracts the concrete transport, allowing different backends
/// (HTTP completion server, test mocks) to be used interchangeably by the
/// pipeline.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    /// Generates a complete text response for a prompt.
    async fn generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError>;

    /// Generates a streaming response, sending fragments as they arrive.
    async fn stream_generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        chunk_sender: mpsc::Sender<StreamChunk>,
    ) -> Result<(), CompletionError>;

    /// Probes backend availability without performing a completion.
    async fn is_available(&self) -> bool;
}
