//! Basic text statistics attached to every analysis result.

use serde::{Deserialize, Serialize};

/// Assumed reading speed for the reading-time estimate.
const READING_WPM: usize = 225;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStats {
    pub word_count: usize,
    pub sentence_count: usize,
    pub character_count: usize,
    pub reading_time_minutes: usize,
}

impl TextStats {
    pub fn compute(text: &str) -> Self {
        let word_count = text.split_whitespace().count();
        let sentence_count = count_sentences(text);
        let character_count = text.chars().count();
        let reading_time_minutes = if word_count == 0 {
            0
        } else {
            word_count.div_ceil(READING_WPM).max(1)
        };
        Self {
            word_count,
            sentence_count,
            character_count,
            reading_time_minutes,
        }
    }
}

fn count_sentences(text: &str) -> usize {
    let mut count = 0;
    let mut prev_terminator = false;
    for c in text.chars() {
        let terminator = matches!(c, '.' | '!' | '?');
        if terminator && !prev_terminator {
            count += 1;
        }
        prev_terminator = terminator;
    }
    // Trailing text without a terminator still counts as a sentence.
    if count == 0 && !text.trim().is_empty() {
        count = 1;
    }
    count
}
