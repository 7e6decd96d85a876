//! HTTP completion client with rate limiting, retries, and model rotation.
//!
//! One logical call walks: rate check -> self throttle -> send with bounded
//! timeout -> classify -> retry / rotate / fail. Every backend failure mode
//! resolves into a typed [`CompletionError`]; callers never see an unhandled
//! transport error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::backend::{CompletionError, CompletionOptions, StreamChunk, TextGenerator};
use super::rate_limit::{RateCheck, RateLimitState};
use crate::config::CompletionConfig;
use crate::error::AppError;

const MAX_BACKOFF: Duration = Duration::from_secs(8);
const SELF_THROTTLE_PAUSE: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);
/// Longest the retry loop will actually sleep on a 429 before re-attempting.
const MAX_RETRY_AFTER_WAIT: Duration = Duration::from_secs(5);
const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies matching any of these are treated as model-specific
/// failures and trigger rotation instead of a plain retry.
const MODEL_FAILURE_SIGNATURES: &[&str] = &[
    "model_not_found",
    "model not found",
    "unknown model",
    "no such model",
    "model is overloaded",
    "model_overloaded",
    "failed to load model",
];

/// Client for the text-generation backend.
///
/// Rate-limit state is owned here, behind one mutex, and shared by every
/// call on this instance. Construct one per process (or per test).
pub struct CompletionClient {
    config: CompletionConfig,
    http: Client,
    headers: HeaderMap,
    state: Mutex<RateLimitState>,
    /// Index into `config.models` of the currently preferred model.
    /// Advanced by rotation and sticky across calls.
    active_model: AtomicUsize,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, AppError> {
        config.check()?;

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_key {
            let value = format!("Bearer {}", token)
                .parse()
                .map_err(|e| AppError::Config(format!("invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {}", e)))?;

        let state = Mutex::new(RateLimitState::new(
            config.throttle_max_requests,
            config.throttle_window(),
        ));

        Ok(Self {
            config,
            http,
            headers,
            state,
            active_model: AtomicUsize::new(0),
        })
    }

    /// The model the next unpinned call will try first.
    pub fn preferred_model(&self) -> &str {
        let idx = self.active_model.load(Ordering::Relaxed) % self.config.models.len();
        &self.config.models[idx]
    }

    fn state(&self) -> MutexGuard<'_, RateLimitState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rotate_model(&self, failed: &str) -> String {
        let next = (self.active_model.load(Ordering::Relaxed) + 1) % self.config.models.len();
        self.active_model.store(next, Ordering::Relaxed);
        let model = self.config.models[next].clone();
        info!("rotating model: {} -> {}", failed, model);
        model
    }

    /// Blocking completion: returns the full generated text.
    pub async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        self.with_retry(options, |model| async move {
            let res = self.send_request(prompt, options, &model, false).await?;
            let json: serde_json::Value = res
                .json()
                .await
                .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
            match json.get("content").and_then(|v| v.as_str()) {
                Some(text) => Ok(text.to_string()),
                None => Err(CompletionError::MalformedResponse(
                    "response missing 'content' field".to_string(),
                )),
            }
        })
        .await
    }

    /// Streaming completion: decodes the SSE response incrementally and
    /// forwards each fragment over `chunk_sender`.
    pub async fn complete_streaming(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        chunk_sender: mpsc::Sender<StreamChunk>,
    ) -> Result<(), CompletionError> {
        let res = self
            .with_retry(options, |model| async move {
                self.send_request(prompt, options, &model, true).await
            })
            .await?;

        let result = pump_stream(res, &chunk_sender).await;
        if result.is_err() {
            self.state()
                .record_failure(self.config.error_threshold, self.config.error_cooldown());
        }
        result
    }

    /// Probe backend availability. Returns false immediately while a
    /// cooldown is active, without touching the network.
    pub async fn probe(&self) -> bool {
        if self.state().is_limited() {
            return false;
        }
        let url = format!("{}/health", self.config.endpoint.trim_end_matches('/'));
        let fut = self.http.get(&url).headers(self.headers.clone()).send();
        match timeout(HEALTH_TIMEOUT, fut).await {
            Ok(Ok(res)) => res.status().is_success(),
            _ => false,
        }
    }

    /// Consult the rate limiter before any network I/O. Fails fast while a
    /// cooldown is active; pauses briefly when the self-imposed window is
    /// full.
    async fn admit(&self) -> Result<(), CompletionError> {
        // The guard must drop before the throttle sleep: holding it across
        // an await point would block other callers and make the future
        // non-Send.
        let check = self.state().check();
        match check {
            RateCheck::Allowed => Ok(()),
            RateCheck::LimitedFor(remaining) => Err(CompletionError::RateLimited {
                retry_after: remaining,
            }),
            RateCheck::Throttled => {
                debug!("request window full, pausing {:?}", SELF_THROTTLE_PAUSE);
                tokio::time::sleep(SELF_THROTTLE_PAUSE).await;
                self.state().note_request();
                Ok(())
            }
        }
    }

    /// Single retry policy shared by blocking and streaming calls.
    ///
    /// `op` performs one attempt against a named model. Retryable errors back
    /// off exponentially; model-specific failures rotate to the next model in
    /// the priority list with a fresh attempt budget; everything else is
    /// terminal. The attempt ceiling per model is `config.max_retries`.
    async fn with_retry<T, F, Fut>(
        &self,
        options: &CompletionOptions,
        mut op: F,
    ) -> Result<T, CompletionError>
    where
        F: FnMut(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, CompletionError>>,
    {
        self.admit().await?;

        let pinned = options.model.clone();
        let mut model = pinned
            .clone()
            .unwrap_or_else(|| self.preferred_model().to_string());
        let mut attempt: u32 = 0;
        let mut rotations: u32 = 0;

        loop {
            attempt += 1;
            let err = match op(model.clone()).await {
                Ok(value) => {
                    self.state().record_success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            // Every 429 marks the shared state, whether or not a retry
            // remains; later calls and probes must fail fast until the
            // hinted deadline passes.
            if let CompletionError::RateLimited { retry_after } = &err {
                self.state().mark_limited_for(*retry_after);
            }

            match &err {
                CompletionError::ModelUnavailable { .. }
                    if pinned.is_none()
                        && self.config.models.len() > 1
                        && rotations < self.config.max_model_rotations =>
                {
                    model = self.rotate_model(&model);
                    rotations += 1;
                    attempt = 0;
                }
                CompletionError::RateLimited { retry_after }
                    if attempt < self.config.max_retries =>
                {
                    let wait = (*retry_after).min(MAX_RETRY_AFTER_WAIT);
                    warn!("backend rate limited, waiting {:?} (attempt {})", wait, attempt);
                    tokio::time::sleep(wait).await;
                }
                e if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    debug!(
                        "retryable failure on model {}: {} (attempt {}, backing off {:?})",
                        model, e, attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    self.state()
                        .record_failure(self.config.error_threshold, self.config.error_cooldown());
                    return Err(err);
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(6);
        (self.config.backoff_base() * 2u32.pow(exp)).min(MAX_BACKOFF)
    }

    /// One request attempt: bounded by the configured timeout, with every
    /// non-success response classified into a typed error.
    async fn send_request(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        model: &str,
        stream: bool,
    ) -> Result<Response, CompletionError> {
        let mut payload = serde_json::json!({
            "prompt": prompt,
            "model": model,
            "stream": stream,
            "n_predict": options.max_tokens,
            "temperature": options.temperature,
        });
        if let Some(system) = &options.system_prompt {
            payload["system_prompt"] = serde_json::Value::String(system.clone());
        }

        let url = format!("{}/completion", self.config.endpoint.trim_end_matches('/'));
        let fut = self
            .http
            .post(&url)
            .headers(self.headers.clone())
            .json(&payload)
            .send();

        let res = match timeout(self.config.timeout(), fut).await {
            Err(_) => return Err(CompletionError::Timeout(self.config.timeout())),
            Ok(Err(e)) => return Err(CompletionError::Connection(e.to_string())),
            Ok(Ok(res)) => res,
        };

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let retry_after = parse_retry_after(res.headers());
        let body = res.text().await.unwrap_or_default();
        Err(classify_failure(status, retry_after, &body, model))
    }
}

#[async_trait]
impl TextGenerator for CompletionClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        self.complete(prompt, options).await
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        chunk_sender: mpsc::Sender<StreamChunk>,
    ) -> Result<(), CompletionError> {
        self.complete_streaming(prompt, options, chunk_sender).await
    }

    async fn is_available(&self) -> bool {
        self.probe().await
    }
}

/// Decode an SSE completion stream, forwarding `content` deltas.
///
/// The response body is dropped when this function returns, on success and
/// error alike.
async fn pump_stream(
    res: Response,
    chunk_sender: &mpsc::Sender<StreamChunk>,
) -> Result<(), CompletionError> {
    let mut stream = res.bytes_stream();
    let mut buf = String::new();

    loop {
        let bytes = match timeout(STREAM_CHUNK_TIMEOUT, stream.next()).await {
            Err(_) => return Err(CompletionError::Timeout(STREAM_CHUNK_TIMEOUT)),
            Ok(None) => break,
            Ok(Some(Err(e))) => return Err(CompletionError::Connection(e.to_string())),
            Ok(Some(Ok(bytes))) => bytes,
        };
        buf.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(pos) = buf.find('\n') {
            let line: String = buf.drain(..=pos).collect();
            if forward_line(line.trim(), chunk_sender).await == LineOutcome::Finished {
                return Ok(());
            }
        }
    }

    // The stream may close on a data line with no trailing newline; it still
    // carries a fragment that must be delivered.
    if forward_line(buf.trim(), chunk_sender).await == LineOutcome::Finished {
        return Ok(());
    }

    let _ = chunk_sender
        .send(StreamChunk { text: String::new(), last: true })
        .await;
    Ok(())
}

#[derive(PartialEq)]
enum LineOutcome {
    Continue,
    Finished,
}

/// Parse one SSE line, forwarding any `content` fragment it carries.
/// `Finished` means a terminal chunk was delivered (or the receiver is gone).
async fn forward_line(line: &str, chunk_sender: &mpsc::Sender<StreamChunk>) -> LineOutcome {
    let Some(data) = line.strip_prefix("data: ") else {
        return LineOutcome::Continue;
    };
    if data == "[DONE]" {
        let _ = chunk_sender
            .send(StreamChunk { text: String::new(), last: true })
            .await;
        return LineOutcome::Finished;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
        return LineOutcome::Continue;
    };
    if let Some(content) = json.get("content").and_then(|v| v.as_str()) {
        let last = json.get("stop").and_then(|v| v.as_bool()).unwrap_or(false);
        let chunk = StreamChunk { text: content.to_string(), last };
        if chunk_sender.send(chunk).await.is_err() {
            // Receiver went away; nothing left to deliver.
            return LineOutcome::Finished;
        }
        if last {
            return LineOutcome::Finished;
        }
    }
    LineOutcome::Continue
}

fn classify_failure(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    model: &str,
) -> CompletionError {
    let message = truncate_message(body);
    match status.as_u16() {
        429 => CompletionError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        },
        401 | 403 => CompletionError::AuthFailure {
            status: status.as_u16(),
        },
        s if s >= 500 => CompletionError::TransientServer { status: s, message },
        _ if is_model_failure(body) => CompletionError::ModelUnavailable {
            model: model.to_string(),
            message,
        },
        s => CompletionError::Backend { status: s, message },
    }
}

fn is_model_failure(body: &str) -> bool {
    let lower = body.to_lowercase();
    MODEL_FAILURE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate_message(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
