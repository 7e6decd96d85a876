//! Topic extraction and merging.
//!
//! Each chunk is analyzed independently for candidate topics, via the
//! completion backend when it is reachable and a keyword heuristic when it is
//! not. Candidates are then merged across chunks by name overlap, scored by
//! how many distinct chunks they surfaced in, and linked back to the sections
//! that discuss them.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::completion::{CompletionOptions, TextGenerator};
use crate::error::AppError;

use super::chunker::Chunk;
use super::json_extract::{parse_model_json, ModelJson};
use super::keywords::KeywordExtractor;
use super::result::{Section, Topic};
use super::CancelFlag;

const TOPIC_SYSTEM_PROMPT: &str =
    "You are a precise content analyst. Respond only with valid JSON.";

const TOPIC_PROMPT: &str = "Identify the main topics discussed in the following text.\n\n\
Respond with a JSON array of 5 to 8 objects, each with a \"name\" field \
(2 to 5 words) and a \"description\" field (one sentence). \
Respond with the JSON array only, no other text.\n\nText:\n{text}";

/// Two candidate names merge when their shared significant tokens cover at
/// least this fraction of either name.
const MERGE_OVERLAP: f32 = 0.5;

/// Maximum sections linked to a single topic.
const MAX_LINKED_SECTIONS: usize = 5;

/// A topic proposed by a single chunk, before cross-chunk merging.
#[derive(Debug, Clone)]
pub struct TopicCandidate {
    pub name: String,
    pub description: String,
    pub chunk_index: usize,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    name: String,
    #[serde(default)]
    description: String,
}

pub struct TopicExtractor {
    generator: Arc<dyn TextGenerator>,
    keywords: KeywordExtractor,
    max_topics: usize,
}

impl TopicExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, max_topics: usize) -> Self {
        Self {
            generator,
            keywords: KeywordExtractor::new(),
            max_topics,
        }
    }

    /// Extract merged, section-linked topics from the given chunks.
    pub async fn extract(
        &self,
        chunks: &[Chunk],
        sections: &[Section],
        use_backend: bool,
        cancel: &CancelFlag,
    ) -> Result<Vec<Topic>, AppError> {
        let candidates = self.candidates(chunks, use_backend, cancel).await?;
        let mut topics = self.merge(candidates);
        link_sections(&mut topics, sections);
        Ok(topics)
    }

    /// Collect per-chunk topic candidates. Chunk failures degrade to the
    /// keyword heuristic for that chunk rather than failing the run.
    pub async fn candidates(
        &self,
        chunks: &[Chunk],
        use_backend: bool,
        cancel: &CancelFlag,
    ) -> Result<Vec<TopicCandidate>, AppError> {
        let mut candidates = Vec::new();
        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let from_backend = if use_backend {
                self.chunk_topics(&chunk.text, chunk.index).await
            } else {
                None
            };
            match from_backend {
                Some(mut batch) => candidates.append(&mut batch),
                None => candidates.extend(self.heuristic_topics(&chunk.text, chunk.index)),
            }
        }
        Ok(candidates)
    }

    async fn chunk_topics(&self, text: &str, chunk_index: usize) -> Option<Vec<TopicCandidate>> {
        let prompt = TOPIC_PROMPT.replace("{text}", text);
        let options = CompletionOptions {
            system_prompt: Some(TOPIC_SYSTEM_PROMPT.to_string()),
            ..CompletionOptions::default()
        }
        .with_temperature(0.2)
        .with_max_tokens(512);

        let raw = match self.generator.generate(&prompt, &options).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(chunk_index, error = %e, "topic completion failed, using keyword fallback");
                return None;
            }
        };

        match parse_model_json::<Vec<RawTopic>>(&raw) {
            ModelJson::Parsed(raw_topics) => {
                let batch: Vec<TopicCandidate> = raw_topics
                    .into_iter()
                    .filter(|t| !t.name.trim().is_empty())
                    .map(|t| TopicCandidate {
                        name: t.name.trim().to_string(),
                        description: t.description.trim().to_string(),
                        chunk_index,
                    })
                    .collect();
                if batch.is_empty() {
                    None
                } else {
                    Some(batch)
                }
            }
            ModelJson::Unparseable(_) => {
                debug!(chunk_index, "topic completion returned no parseable JSON");
                None
            }
        }
    }

    /// Keyword-based candidates for chunks the backend could not analyze.
    fn heuristic_topics(&self, text: &str, chunk_index: usize) -> Vec<TopicCandidate> {
        self.keywords
            .extract(text, Some(5))
            .into_iter()
            .map(|k| TopicCandidate {
                name: capitalize(&k.keyword),
                description: format!("Recurring term mentioned {} times.", k.frequency),
                chunk_index,
            })
            .collect()
    }

    /// Merge candidates across chunks by name overlap. Score is the number of
    /// distinct chunks a topic surfaced in.
    pub fn merge(&self, candidates: Vec<TopicCandidate>) -> Vec<Topic> {
        struct Group {
            name: String,
            tokens: HashSet<String>,
            description: String,
            chunks: HashSet<usize>,
        }

        let mut groups: Vec<Group> = Vec::new();
        for candidate in candidates {
            let tokens = name_tokens(&candidate.name);
            if tokens.is_empty() {
                continue;
            }
            let existing = groups
                .iter_mut()
                .find(|g| overlap_ratio(&g.tokens, &tokens) >= MERGE_OVERLAP);
            match existing {
                Some(group) => {
                    group.chunks.insert(candidate.chunk_index);
                    if candidate.description.len() > group.description.len() {
                        group.description = candidate.description;
                    }
                }
                None => groups.push(Group {
                    name: candidate.name,
                    tokens,
                    description: candidate.description,
                    chunks: HashSet::from([candidate.chunk_index]),
                }),
            }
        }

        let mut topics: Vec<Topic> = groups
            .into_iter()
            .map(|g| Topic {
                id: Uuid::new_v4().to_string(),
                score: g.chunks.len(),
                name: g.name,
                description: g.description,
                related_section_ids: Vec::new(),
            })
            .collect();

        topics.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        topics.truncate(self.max_topics);
        topics
    }
}

/// Attach each topic to the sections most likely to discuss it.
pub fn link_sections(topics: &mut [Topic], sections: &[Section]) {
    for topic in topics.iter_mut() {
        let name_lower = topic.name.to_lowercase();
        let words: Vec<&str> = name_lower.split_whitespace().filter(|w| w.len() > 3).collect();

        let mut scored: Vec<(usize, &Section)> = sections
            .iter()
            .map(|section| {
                let title = section.title.to_lowercase();
                let content = section.content.to_lowercase();
                let mut score = 0usize;
                if title.contains(&name_lower) {
                    score += 10;
                }
                for word in &words {
                    if title.contains(word) {
                        score += 3;
                    }
                    score += content.matches(word).count();
                }
                (score, section)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        topic.related_section_ids = scored
            .into_iter()
            .take(MAX_LINKED_SECTIONS)
            .map(|(_, s)| s.id.clone())
            .collect();

        // A topic with no textual match still gets anchored somewhere.
        if topic.related_section_ids.is_empty() {
            topic.related_section_ids = sections
                .iter()
                .take(3)
                .map(|s| s.id.clone())
                .collect();
        }
    }
}

fn name_tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect()
}

fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f32;
    (shared / a.len() as f32).max(shared / b.len() as f32)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, StreamChunk};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<String, CompletionError> {
            Err(CompletionError::Connection("down".into()))
        }

        async fn stream_generate(
            &self,
            _prompt: &str,
            _options: &CompletionOptions,
            _chunk_sender: mpsc::Sender<StreamChunk>,
        ) -> Result<(), CompletionError> {
            Err(CompletionError::Connection("down".into()))
        }

        async fn is_available(&self) -> bool {
            false
        }
    }

    fn extractor() -> TopicExtractor {
        TopicExtractor::new(Arc::new(FailingGenerator), 10)
    }

    fn candidate(name: &str, description: &str, chunk_index: usize) -> TopicCandidate {
        TopicCandidate {
            name: name.to_string(),
            description: description.to_string(),
            chunk_index,
        }
    }

    fn section(id: &str, title: &str, content: &str) -> Section {
        Section {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            word_count: content.split_whitespace().count(),
            source_id: None,
        }
    }

    #[test]
    fn test_merge_by_name_overlap() {
        let topics = extractor().merge(vec![
            candidate("Machine Learning", "Brief.", 0),
            candidate("Machine Learning Models", "A longer description survives.", 1),
            candidate("Gardening", "Unrelated.", 2),
        ]);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].name, "Machine Learning");
        assert_eq!(topics[0].score, 2);
        assert_eq!(topics[0].description, "A longer description survives.");
    }

    #[test]
    fn test_duplicate_in_same_chunk_scores_once() {
        let topics = extractor().merge(vec![
            candidate("Rust Async", "a", 0),
            candidate("Async Rust", "b", 0),
        ]);
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].score, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let extractor = extractor();
        let input = vec![
            candidate("Data Pipelines", "d", 0),
            candidate("Data Pipelines", "d", 1),
            candidate("Testing", "t", 1),
        ];
        let once = extractor.merge(input.clone());
        let again = extractor.merge(
            once.iter()
                .map(|t| candidate(&t.name, &t.description, 0))
                .collect(),
        );
        assert_eq!(once.len(), again.len());
    }

    #[test]
    fn test_truncates_to_max_topics() {
        let extractor = TopicExtractor::new(Arc::new(FailingGenerator), 2);
        let topics = extractor.merge(vec![
            candidate("Release Cadence", "a", 0),
            candidate("Incident Response", "b", 0),
            candidate("Hiring Pipeline", "c", 0),
        ]);
        assert_eq!(topics.len(), 2);
    }

    #[test]
    fn test_link_prefers_title_match() {
        let sections = vec![
            section("s1", "Deployment Guide", "Nothing relevant."),
            section("s2", "Appendix", "deployment deployment deployment"),
        ];
        let mut topics = vec![Topic {
            id: "t".into(),
            name: "Deployment".into(),
            description: String::new(),
            related_section_ids: vec![],
            score: 1,
        }];
        link_sections(&mut topics, &sections);
        assert_eq!(topics[0].related_section_ids[0], "s1");
    }

    #[test]
    fn test_link_orphan_gets_leading_sections() {
        let sections = vec![section("s1", "One", "alpha"), section("s2", "Two", "beta")];
        let mut topics = vec![Topic {
            id: "t".into(),
            name: "Zzzz Qqqq".into(),
            description: String::new(),
            related_section_ids: vec![],
            score: 1,
        }];
        link_sections(&mut topics, &sections);
        assert_eq!(topics[0].related_section_ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_keywords() {
        let extractor = extractor();
        let chunks = vec![Chunk {
            index: 0,
            start: 0,
            end: 0,
            text: "compiler compiler compiler parser parser tokenizer".into(),
        }];
        let cancel = CancelFlag::default();
        let candidates = extractor.candidates(&chunks, true, &cancel).await.unwrap();
        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].name, "Compiler");
    }

    #[tokio::test]
    async fn test_cancel_aborts_extraction() {
        let extractor = extractor();
        let chunks = vec![Chunk {
            index: 0,
            start: 0,
            end: 0,
            text: "text".into(),
        }];
        let cancel = CancelFlag::default();
        cancel.cancel();
        let result = extractor.candidates(&chunks, false, &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
