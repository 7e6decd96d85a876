//! Document segmentation.
//!
//! Divides a document into titled sections. The primary strategy scans for
//! heading-like lines (markdown `#` prefixes, numbered headings, short lines
//! ending in a colon); when that yields fewer than two sections, a fallback
//! groups blank-line-delimited paragraphs into roughly equal word-count
//! sections. Oversized input is chunked first and each chunk segmented
//! independently.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use super::chunker::chunk_text;
use super::result::Section;

/// Target word count for fallback paragraph-grouped sections.
const TARGET_SECTION_WORDS: usize = 300;
/// Titles derived from a first sentence are only used below this length.
const MAX_DERIVED_TITLE_LEN: usize = 60;
/// Words taken for an ellipsis title when the first sentence is too long.
const TITLE_WORD_COUNT: usize = 6;

static MARKDOWN_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})\s+(.+)$").expect("Invalid regex: markdown heading")
});
static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:\.\d+)*[.)]\s+(\S.{0,78})$").expect("Invalid regex: numbered heading")
});
static LEADING_NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(?:\.\d+)*[.)]\s*").expect("Invalid regex: leading numbering")
});

/// Splits a document into titled sections.
pub struct Segmenter {
    /// Inputs above this many bytes are chunked before segmentation.
    chunk_threshold: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(30_000)
    }
}

impl Segmenter {
    pub fn new(chunk_threshold: usize) -> Self {
        Self { chunk_threshold }
    }

    /// Segment `text` into at least one section for any non-empty input.
    pub fn segment(&self, text: &str) -> Vec<Section> {
        self.segment_source(text, None)
    }

    /// Segment `text`, tagging every produced section with `source_id`.
    pub fn segment_source(&self, text: &str, source_id: Option<&str>) -> Vec<Section> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        if text.len() <= self.chunk_threshold {
            return self.segment_inner(text, source_id);
        }

        // Chunk with zero overlap so concatenated section content still
        // reproduces the document.
        let chunks = chunk_text(text, self.chunk_threshold, 0);
        let multi = chunks.len() > 1;
        let mut sections = Vec::new();
        for chunk in &chunks {
            let mut chunk_sections = self.segment_inner(&chunk.text, source_id);
            if multi {
                for section in &mut chunk_sections {
                    section.title = format!("{} (Part {})", section.title, chunk.index + 1);
                }
            }
            sections.append(&mut chunk_sections);
        }
        sections
    }

    fn segment_inner(&self, text: &str, source_id: Option<&str>) -> Vec<Section> {
        let sections = self.segment_by_headings(text, source_id);
        if sections.len() >= 2 {
            return sections;
        }
        self.segment_by_paragraphs(text, source_id)
    }

    /// Primary strategy: heading-delimited sections, with the text before
    /// the first heading becoming an "Introduction" section.
    fn segment_by_headings(&self, text: &str, source_id: Option<&str>) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current_title: Option<String> = None;
        let mut buffer = String::new();

        let mut flush = |title: Option<String>, buffer: &mut String, sections: &mut Vec<Section>| {
            if buffer.trim().is_empty() {
                buffer.clear();
                return;
            }
            let title = title.unwrap_or_else(|| "Introduction".to_string());
            sections.push(build_section(title, buffer.trim_end(), source_id));
            buffer.clear();
        };

        for line in text.lines() {
            if let Some(title) = heading_title(line) {
                flush(current_title.take(), &mut buffer, &mut sections);
                current_title = Some(title);
            }
            buffer.push_str(line);
            buffer.push('\n');
        }
        flush(current_title.take(), &mut buffer, &mut sections);

        sections
    }

    /// Fallback strategy: group consecutive paragraphs into sections of
    /// roughly [`TARGET_SECTION_WORDS`] words.
    fn segment_by_paragraphs(&self, text: &str, source_id: Option<&str>) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut group: Vec<&str> = Vec::new();
        let mut group_words = 0usize;

        let mut flush = |group: &mut Vec<&str>, sections: &mut Vec<Section>| {
            if group.is_empty() {
                return;
            }
            let content = group.join("\n\n");
            let title = derive_title(&content);
            sections.push(build_section(title, &content, source_id));
            group.clear();
        };

        for paragraph in text.split("\n\n") {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }
            let words = trimmed.split_whitespace().count();
            if group_words > 0 && group_words + words > TARGET_SECTION_WORDS {
                flush(&mut group, &mut sections);
                group_words = 0;
            }
            group.push(trimmed);
            group_words += words;
        }
        flush(&mut group, &mut sections);

        if sections.is_empty() {
            // Whitespace-only paragraphs but non-empty text, e.g. "\n \n".
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                sections.push(build_section(derive_title(trimmed), trimmed, source_id));
            }
        }
        sections
    }
}

/// If `line` looks like a heading, return its cleaned title.
fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = MARKDOWN_HEADING.captures(trimmed) {
        return Some(clean_title(&caps[2]));
    }
    if let Some(caps) = NUMBERED_HEADING.captures(trimmed) {
        // Numbered lines ending in sentence punctuation are prose, not
        // headings.
        let candidate = caps[1].trim();
        if !candidate.ends_with('.') && !candidate.ends_with(',') {
            return Some(clean_title(candidate));
        }
    }
    if trimmed.len() < MAX_DERIVED_TITLE_LEN && trimmed.ends_with(':') && !trimmed.contains('.') {
        return Some(clean_title(trimmed));
    }
    None
}

/// Strip markup, numbering, and trailing colon from a heading.
fn clean_title(raw: &str) -> String {
    let no_numbering = LEADING_NUMBERING.replace(raw, "");
    no_numbering
        .trim_matches(|c: char| c == '*' || c == '_' || c == '#')
        .trim_end_matches(':')
        .trim()
        .to_string()
}

/// Derive a title from content: the first sentence when short enough,
/// otherwise the first few words with an ellipsis.
fn derive_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    let sentence_end = first_line
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, _)| i);
    if let Some(end) = sentence_end {
        let sentence = first_line[..end].trim();
        if !sentence.is_empty() && sentence.len() < MAX_DERIVED_TITLE_LEN {
            return sentence.to_string();
        }
    } else if !first_line.is_empty() && first_line.len() < MAX_DERIVED_TITLE_LEN {
        return first_line.to_string();
    }

    let words: Vec<&str> = content.split_whitespace().take(TITLE_WORD_COUNT).collect();
    format!("{}…", words.join(" "))
}

fn build_section(title: String, content: &str, source_id: Option<&str>) -> Section {
    Section {
        id: Uuid::new_v4().to_string(),
        title,
        content: content.to_string(),
        word_count: content.split_whitespace().count(),
        source_id: source_id.map(|s| s.to_string()),
    }
}
