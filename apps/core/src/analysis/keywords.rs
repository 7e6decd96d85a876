//! Keyword extraction by stop-word-filtered term frequency.
//!
//! Produces the ranked keyword list on the analysis result and serves as the
//! topic-extraction fallback when the completion backend is unavailable.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// English stopwords.
pub(crate) const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "nor", "for", "yet", "so", "i", "you", "he", "she", "it",
    "we", "they", "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their",
    "mine", "yours", "hers", "ours", "theirs", "this", "that", "these", "those", "who", "whom",
    "which", "what", "whose", "is", "am", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "having", "do", "does", "did", "doing", "will", "would", "shall", "should",
    "can", "could", "may", "might", "must", "in", "on", "at", "to", "from", "by", "with", "about",
    "against", "between", "into", "through", "during", "before", "after", "above", "below", "up",
    "down", "out", "off", "over", "under", "again", "further", "here", "there", "where", "when",
    "why", "how", "all", "each", "every", "both", "few", "more", "most", "other", "some", "any",
    "no", "not", "only", "own", "same", "than", "too", "very", "just", "also", "now", "then",
    "once", "always", "never", "if", "because", "as", "until", "while", "although", "though",
    "yes", "maybe", "s", "t", "ve", "re", "ll", "d", "m",
];

/// One extracted keyword with its ranking score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordResult {
    pub keyword: String,
    /// Frequency-based score used only for ranking.
    pub score: f32,
    /// Raw occurrence count in the text.
    pub frequency: usize,
}

/// Frequency-based keyword extractor.
pub struct KeywordExtractor {
    stopwords: HashSet<&'static str>,
    min_word_length: usize,
    max_keywords: usize,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self::with_config(3, 10)
    }

    pub fn with_config(min_word_length: usize, max_keywords: usize) -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
            min_word_length,
            max_keywords,
        }
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Tokenize text into lowercase words, filtering stopwords, short
    /// tokens, and pure numbers.
    pub(crate) fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .filter(|word| {
                let w = word.trim();
                w.len() >= self.min_word_length
                    && !self.is_stopword(w)
                    && !w.chars().all(|c| c.is_numeric())
            })
            .map(|s| s.to_string())
            .collect()
    }

    /// Extract the top keywords from text, ranked by weighted frequency.
    pub fn extract(&self, text: &str, top_k: Option<usize>) -> Vec<KeywordResult> {
        let max_results = top_k.unwrap_or(self.max_keywords);
        let words = self.tokenize(text);
        if words.is_empty() {
            return vec![];
        }

        let mut freq: HashMap<String, usize> = HashMap::new();
        for word in &words {
            *freq.entry(word.clone()).or_insert(0) += 1;
        }

        let mut results: Vec<KeywordResult> = freq
            .into_iter()
            .map(|(word, count)| {
                // Longer words tend to be more specific.
                let length_weight = 1.0 + (word.len() as f32 / 10.0).min(0.8);
                KeywordResult {
                    score: count as f32 * length_weight,
                    frequency: count,
                    keyword: word,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });

        results.into_iter().take(max_results).collect()
    }

    /// Extract keywords and return just the strings.
    pub fn extract_keywords(&self, text: &str, top_k: Option<usize>) -> Vec<String> {
        self.extract(text, top_k)
            .into_iter()
            .map(|k| k.keyword)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_extraction() {
        let extractor = KeywordExtractor::new();

        let text = "The pipeline chunks documents, the pipeline summarizes chunks, \
                    and the pipeline extracts topics from documents.";
        let keywords = extractor.extract(text, Some(5));

        assert!(!keywords.is_empty());
        assert_eq!(keywords[0].keyword, "pipeline");
        assert_eq!(keywords[0].frequency, 3);
    }

    #[test]
    fn test_stopword_filtering() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract("the a an is are was were", Some(5));
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_empty_text() {
        let extractor = KeywordExtractor::new();
        assert!(extractor.extract("", Some(5)).is_empty());
        assert!(extractor.extract("   ", Some(5)).is_empty());
    }

    #[test]
    fn test_short_words_and_numbers_filtered() {
        let extractor = KeywordExtractor::new();
        let keywords = extractor.extract("a b c 12 345 zz", Some(10));
        assert!(keywords.is_empty());
    }

    #[test]
    fn test_deterministic_order_on_ties() {
        let extractor = KeywordExtractor::new();
        let first = extractor.extract_keywords("zebra yak zebra yak", Some(2));
        let second = extractor.extract_keywords("zebra yak zebra yak", Some(2));
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_k_limit() {
        let extractor = KeywordExtractor::new();
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        assert_eq!(extractor.extract(text, Some(3)).len(), 3);
    }
}
