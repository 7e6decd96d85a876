//! # Completion Module
//!
//! The single gateway to the text-generation backend.
//!
//! ## Components
//! - `backend`: the `TextGenerator` trait seam, options, and error taxonomy
//! - `rate_limit`: sliding-window throttle, cooldowns, error breaker
//! - `client`: the resilient HTTP client (retries, backoff, model rotation,
//!   SSE streaming, availability probe)

pub mod backend;
pub mod client;
pub mod rate_limit;

pub use backend::{CompletionError, CompletionOptions, StreamChunk, TextGenerator};
pub use client::CompletionClient;
pub use rate_limit::{RateCheck, RateLimitState};
