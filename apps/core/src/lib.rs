//! textlens-core: resilient LLM-backed content analysis.
//!
//! The crate has two halves. `completion` owns everything about talking to the
//! text-generation backend (retries, backoff, model rotation, rate limiting,
//! streaming). `analysis` builds the pipeline on top of it: chunking,
//! segmentation, topic extraction, summarization, and statistics, all behind
//! the `TextGenerator` trait so the pipeline never depends on a live backend.

pub mod analysis;
pub mod completion;
pub mod config;
pub mod error;

#[cfg(test)]
mod tests;

pub use analysis::{AnalysisResult, AnalyzeOptions, CancelFlag, ContentAnalyzer, Document};
pub use completion::{CompletionClient, CompletionError, CompletionOptions, TextGenerator};
pub use config::{AnalyzerConfig, CompletionConfig};
pub use error::AppError;
