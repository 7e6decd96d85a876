//! Content analysis pipeline.
//!
//! Turns a document (a main text plus optional auxiliary sources) into a
//! structured result: summary, keywords, titled sections, cross-chunk topics,
//! and basic statistics. The pipeline leans on the completion backend where
//! it is reachable and degrades to heuristics where it is not.

pub mod analyzer;
pub mod chunker;
pub mod json_extract;
pub mod keywords;
pub mod result;
pub mod segmenter;
pub mod stats;
pub mod summarizer;
pub mod topics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use analyzer::{AnalyzeOptions, ContentAnalyzer, ProgressFn};
pub use chunker::{chunk_text, Chunk};
pub use keywords::{KeywordExtractor, KeywordResult};
pub use result::{
    AnalysisResult, Document, ProcessingInfo, ProcessingMode, Section, SourceKind, SourceText,
    Topic,
};
pub use segmenter::Segmenter;
pub use stats::TextStats;
pub use summarizer::Summarizer;
pub use topics::{TopicCandidate, TopicExtractor};

/// Cooperative cancellation handle, checked between pipeline stages and
/// between per-chunk completions.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
