//! Pipeline orchestration.
//!
//! `ContentAnalyzer` drives the full run: source collection, segmentation,
//! topic extraction, summarization, and statistics. Every stage after input
//! validation degrades instead of failing, so a reachable backend is never a
//! requirement for producing a result.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::completion::TextGenerator;
use crate::config::AnalyzerConfig;
use crate::error::AppError;

use super::chunker::{chunk_text, Chunk};
use super::keywords::KeywordExtractor;
use super::result::{
    AnalysisResult, Document, ProcessingInfo, ProcessingMode, Section, Topic,
};
use super::segmenter::Segmenter;
use super::stats::TextStats;
use super::summarizer::Summarizer;
use super::topics::{TopicCandidate, TopicExtractor};
use super::CancelFlag;

/// Progress observer invoked with a short stage description.
pub type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Per-run options.
#[derive(Default, Clone)]
pub struct AnalyzeOptions {
    pub progress: Option<Arc<ProgressFn>>,
    pub cancel: CancelFlag,
}

impl AnalyzeOptions {
    fn report(&self, stage: &str) {
        if let Some(progress) = &self.progress {
            progress(stage);
        }
    }

    fn checkpoint(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            Err(AppError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct CollectedSource {
    id: String,
    title: String,
    text: String,
}

pub struct ContentAnalyzer {
    generator: Arc<dyn TextGenerator>,
    config: AnalyzerConfig,
    segmenter: Segmenter,
    summarizer: Summarizer,
    topics: TopicExtractor,
    keywords: KeywordExtractor,
}

impl ContentAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: AnalyzerConfig) -> Self {
        let segmenter = Segmenter::new(config.segment_chunk_threshold);
        let summarizer = Summarizer::new(generator.clone(), config.clone());
        let topics = TopicExtractor::new(generator.clone(), config.max_topics);
        let keywords = KeywordExtractor::with_config(3, config.max_keywords);
        Self {
            generator,
            config,
            segmenter,
            summarizer,
            topics,
            keywords,
        }
    }

    pub async fn analyze(&self, document: &Document) -> Result<AnalysisResult, AppError> {
        self.analyze_with(document, AnalyzeOptions::default()).await
    }

    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn analyze_with(
        &self,
        document: &Document,
        options: AnalyzeOptions,
    ) -> Result<AnalysisResult, AppError> {
        let started = Instant::now();

        options.report("collecting sources");
        let sources = collect_sources(document);
        if sources.is_empty() {
            return Err(AppError::Validation(
                "document contains no analyzable text".to_string(),
            ));
        }

        options.report("probing backend availability");
        let backend_available = self.generator.is_available().await;
        if !backend_available {
            info!("completion backend unreachable, running in degraded mode");
        }

        let total_len: usize = sources.iter().map(|s| s.text.len()).sum();
        let mode = if total_len > self.config.distributed_threshold && sources.len() > 1 {
            ProcessingMode::Distributed
        } else {
            ProcessingMode::Combined
        };

        options.checkpoint()?;
        options.report("segmenting content");
        let sections = self.segment_sources(&sources);

        options.checkpoint()?;
        options.report("extracting topics");
        let mut topics = match mode {
            ProcessingMode::Combined => {
                let combined = combined_text(&sources);
                let chunks =
                    chunk_text(&combined, self.config.max_chunk_size, self.config.chunk_overlap);
                self.topics
                    .extract(&chunks, &sections, backend_available, &options.cancel)
                    .await?
            }
            ProcessingMode::Distributed => {
                self.distributed_topics(&sources, &sections, backend_available, &options)
                    .await?
            }
        };
        if topics.is_empty() {
            topics = vec![catch_all_topic(&sections)];
        }

        options.checkpoint()?;
        options.report("generating summary");
        let summary = match mode {
            ProcessingMode::Combined => {
                self.summarizer
                    .summarize(&combined_text(&sources), backend_available, &options.cancel)
                    .await?
            }
            ProcessingMode::Distributed => {
                self.distributed_summary(&sources, backend_available, &options)
                    .await?
            }
        };

        options.checkpoint()?;
        options.report("computing statistics");
        let full_text = full_text(&sources);
        let keywords = self.keywords.extract(&full_text, None);
        let stats = TextStats::compute(&full_text);

        let processing = ProcessingInfo {
            mode,
            elapsed_ms: started.elapsed().as_millis() as u64,
            backend_available,
            timestamp: Utc::now(),
        };
        info!(
            mode = ?processing.mode,
            elapsed_ms = processing.elapsed_ms,
            sections = sections.len(),
            topics = topics.len(),
            "analysis complete"
        );

        Ok(AnalysisResult {
            summary,
            keywords,
            sections,
            topics,
            stats,
            processing,
        })
    }

    fn segment_sources(&self, sources: &[CollectedSource]) -> Vec<Section> {
        let attribute = sources.len() > 1;
        sources
            .iter()
            .flat_map(|source| {
                let source_id = attribute.then_some(source.id.as_str());
                self.segmenter.segment_source(&source.text, source_id)
            })
            .collect()
    }

    /// Per-source topic candidates with chunk indices offset so scores count
    /// distinct chunks across the whole run, then one global merge.
    async fn distributed_topics(
        &self,
        sources: &[CollectedSource],
        sections: &[Section],
        backend_available: bool,
        options: &AnalyzeOptions,
    ) -> Result<Vec<Topic>, AppError> {
        let mut all_candidates: Vec<TopicCandidate> = Vec::new();
        let mut chunk_offset = 0usize;
        for source in sources {
            let chunks: Vec<Chunk> =
                chunk_text(&source.text, self.config.max_chunk_size, self.config.chunk_overlap)
                    .into_iter()
                    .map(|mut c| {
                        c.index += chunk_offset;
                        c
                    })
                    .collect();
            chunk_offset += chunks.len();
            let candidates = self
                .topics
                .candidates(&chunks, backend_available, &options.cancel)
                .await?;
            all_candidates.extend(candidates);
        }
        let mut topics = self.topics.merge(all_candidates);
        super::topics::link_sections(&mut topics, sections);
        Ok(topics)
    }

    /// One summary per source, joined under its title.
    async fn distributed_summary(
        &self,
        sources: &[CollectedSource],
        backend_available: bool,
        options: &AnalyzeOptions,
    ) -> Result<String, AppError> {
        let mut parts = Vec::with_capacity(sources.len());
        for source in sources {
            let summary = self
                .summarizer
                .summarize(&source.text, backend_available, &options.cancel)
                .await?;
            parts.push(format!("{}: {}", source.title, summary));
        }
        Ok(parts.join("\n\n"))
    }
}

/// Main text plus non-blank auxiliary sources, in input order.
fn collect_sources(document: &Document) -> Vec<CollectedSource> {
    let mut sources = Vec::new();
    if !document.raw_text.trim().is_empty() {
        sources.push(CollectedSource {
            id: document.id.clone(),
            title: "Main Content".to_string(),
            text: document.raw_text.clone(),
        });
    }
    for source in &document.sources {
        if source.text.trim().is_empty() {
            continue;
        }
        sources.push(CollectedSource {
            id: source.id.clone(),
            title: source.title.clone(),
            text: source.text.clone(),
        });
    }
    sources
}

/// Sources joined for completion prompts, with title separators when there
/// is more than one.
fn combined_text(sources: &[CollectedSource]) -> String {
    if sources.len() == 1 {
        return sources[0].text.clone();
    }
    sources
        .iter()
        .map(|s| format!("=== {} ===\n{}", s.title, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Sources joined without separators, for statistics and keywords.
fn full_text(sources: &[CollectedSource]) -> String {
    sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn catch_all_topic(sections: &[Section]) -> Topic {
    Topic {
        id: Uuid::new_v4().to_string(),
        name: "General Content".to_string(),
        description: "The document as a whole.".to_string(),
        related_section_ids: sections.iter().take(3).map(|s| s.id.clone()).collect(),
        score: 1,
    }
}
