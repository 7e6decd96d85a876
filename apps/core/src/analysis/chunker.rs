//! Boundary-aware text chunker.
//!
//! Splits arbitrary-length text into bounded, overlapping chunks so that
//! downstream stages never exceed backend input-size limits. Window ends are
//! pulled back to the nearest paragraph break, then to the nearest sentence
//! terminator, before falling back to the raw window boundary.
//!
//! # Guarantees
//!
//! - Every chunk's length is at most `max_chunk_size`.
//! - Chunks carry byte offsets into the original text; consecutive chunks
//!   overlap by up to `overlap` bytes.
//! - At least one chunk is produced for any non-empty input, and the loop
//!   always terminates even when no natural boundary exists.
//! - All cuts land on UTF-8 character boundaries.

/// How far back from the window end to look for a paragraph break.
const PARAGRAPH_LOOKBACK: usize = 1_500;
/// How far back from the window end to look for a sentence terminator.
const SENTENCE_LOOKBACK: usize = 500;

/// A bounded substring of a larger document. Transient; never persisted.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the chunk sequence, starting at 0.
    pub index: usize,
    /// Byte offset of the chunk start in the original text.
    pub start: usize,
    /// Byte offset one past the chunk end in the original text.
    pub end: usize,
    pub text: String,
}

/// Split `text` into chunks of at most `max_chunk_size` bytes, with adjacent
/// chunks overlapping by up to `overlap` bytes of shared context.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let max = max_chunk_size.max(1);
    if text.len() <= max {
        return vec![Chunk {
            index: 0,
            start: 0,
            end: text.len(),
            text: text.to_string(),
        }];
    }

    // Overlap must stay well under the window size or the cursor cannot
    // advance.
    let overlap = overlap.min(max / 2);

    let mut chunks = Vec::new();
    let mut pos = 0usize;
    let mut index = 0usize;

    while pos < text.len() {
        let raw_end = snap_to_char_boundary(text, (pos + max).min(text.len()));
        let mut end = raw_end;

        if raw_end < text.len() {
            end = natural_break(text, pos, raw_end);
            // A break that lands inside the overlap region would stall the
            // cursor; fall back to the raw window boundary.
            if end <= pos + overlap {
                end = raw_end;
            }
        }

        chunks.push(Chunk {
            index,
            start: pos,
            end,
            text: text[pos..end].to_string(),
        });
        index += 1;

        if end >= text.len() {
            break;
        }
        pos = snap_to_char_boundary(text, end.saturating_sub(overlap));
    }

    chunks
}

/// Pull a window end backward to the nearest paragraph break, or failing
/// that, the nearest sentence terminator. Returns the raw end when neither
/// is found within its lookback range.
fn natural_break(text: &str, start: usize, raw_end: usize) -> usize {
    let window = &text[start..raw_end];

    let para_from = snap_to_char_boundary(window, window.len().saturating_sub(PARAGRAPH_LOOKBACK));
    if let Some(i) = window[para_from..].rfind("\n\n") {
        let cut = start + para_from + i + 2;
        if cut > start {
            return cut;
        }
    }

    let sent_from = snap_to_char_boundary(window, window.len().saturating_sub(SENTENCE_LOOKBACK));
    let tail = &window[sent_from..];
    let sentence_cut = [". ", "! ", "? "]
        .iter()
        .filter_map(|t| tail.rfind(t))
        .max();
    if let Some(i) = sentence_cut {
        let cut = start + sent_from + i + 2;
        if cut > start {
            return cut;
        }
    }

    raw_end
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
pub(crate) fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
