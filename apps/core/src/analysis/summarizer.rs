//! Summary generation.
//!
//! Short inputs are summarized in one completion. Longer inputs get a
//! map-reduce pass: each chunk is summarized on its own, then the partial
//! summaries are synthesized into one. Any backend failure degrades to an
//! extractive truncation of the input so the pipeline always produces a
//! summary.

use std::sync::Arc;

use tracing::warn;

use crate::completion::{CompletionOptions, TextGenerator};
use crate::config::AnalyzerConfig;
use crate::error::AppError;

use super::chunker::{chunk_text, snap_to_char_boundary};
use super::CancelFlag;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a concise technical writer. Summaries are plain prose, no lists or headings.";

const DIRECT_SUMMARY_PROMPT: &str = "Summarize the following text in 3 to 5 sentences, \
covering its main points.\n\nText:\n{text}\n\nSummary:";

const CHUNK_SUMMARY_PROMPT: &str = "This is part {part} of {total} of a longer document. \
Summarize this part in 2 to 3 sentences.\n\nText:\n{text}\n\nSummary:";

const SYNTHESIS_PROMPT: &str = "The following are summaries of consecutive parts of one \
document. Combine them into a single coherent summary of 4 to 6 sentences.\n\n\
Part summaries:\n{summaries}\n\nCombined summary:";

/// Length of the extractive fallback summary.
const FALLBACK_CHARS: usize = 600;

pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    config: AnalyzerConfig,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: AnalyzerConfig) -> Self {
        Self { generator, config }
    }

    /// Summarize `text`. Degrades to an extractive summary instead of
    /// failing; only cancellation propagates as an error.
    pub async fn summarize(
        &self,
        text: &str,
        use_backend: bool,
        cancel: &CancelFlag,
    ) -> Result<String, AppError> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if !use_backend {
            return Ok(extractive_summary(text));
        }

        if text.len() <= self.config.direct_summary_threshold {
            return Ok(self.direct(text).await);
        }
        self.map_reduce(text, cancel).await
    }

    async fn direct(&self, text: &str) -> String {
        let prompt = DIRECT_SUMMARY_PROMPT.replace("{text}", text);
        match self.generate(&prompt, 512).await {
            Some(summary) => summary,
            None => extractive_summary(text),
        }
    }

    async fn map_reduce(&self, text: &str, cancel: &CancelFlag) -> Result<String, AppError> {
        let chunks = chunk_text(text, self.config.max_chunk_size, self.config.chunk_overlap);
        let total = chunks.len();

        let mut partials = Vec::with_capacity(total);
        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let prompt = CHUNK_SUMMARY_PROMPT
                .replace("{part}", &(chunk.index + 1).to_string())
                .replace("{total}", &total.to_string())
                .replace("{text}", &chunk.text);
            match self.generate(&prompt, 256).await {
                Some(summary) => partials.push(summary),
                None => {
                    warn!(part = chunk.index + 1, total, "chunk summary failed, using extract");
                    partials.push(extractive_summary(&chunk.text));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let joined = partials.join("\n\n");
        let prompt = SYNTHESIS_PROMPT.replace("{summaries}", &joined);
        match self.generate(&prompt, 512).await {
            Some(summary) => Ok(summary),
            None => {
                warn!("synthesis failed, returning joined part summaries");
                Ok(joined)
            }
        }
    }

    async fn generate(&self, prompt: &str, max_tokens: u32) -> Option<String> {
        let options = CompletionOptions {
            system_prompt: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            ..CompletionOptions::default()
        }
        .with_temperature(0.3)
        .with_max_tokens(max_tokens);

        match self.generator.generate(prompt, &options).await {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "summary completion failed");
                None
            }
        }
    }
}

/// Leading slice of the text, cut at a sentence end where one exists.
pub(crate) fn extractive_summary(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= FALLBACK_CHARS {
        return trimmed.to_string();
    }
    let cut = snap_to_char_boundary(trimmed, FALLBACK_CHARS);
    let window = &trimmed[..cut];
    match window.rfind(". ") {
        Some(pos) => window[..pos + 1].to_string(),
        None => format!("{}...", window.trim_end()),
    }
}
