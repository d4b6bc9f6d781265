//! Sentence-respecting chunking with a character budget and sliding overlap.
//!
//! Chunks are the unit of embedding and retrieval. The splitter keeps sentences
//! intact whenever possible: input text is segmented into sentences (UAX #29),
//! sentences are packed greedily into chunks of at most `max_chars` characters,
//! and adjacent chunks then share an overlap window taken from the tail of the
//! previous chunk so context is not lost at boundaries. A sentence longer than
//! the budget is split hard at the character level.
//!
//! After overlap is applied, every chunk holds at most `max_chars + overlap`
//! characters. Whitespace-only input yields an empty sequence, not an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunking was configured with an impossible character budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap window would swallow the entire chunk budget.
    #[error("chunk overlap must be smaller than the chunk size")]
    OverlapTooLarge,
}

/// A contiguous, size-bounded slice of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text content, including any overlap carried from the previous chunk.
    pub text: String,
    /// Zero-based position of the chunk within its document.
    pub index: usize,
}

/// Split text into overlapping, sentence-respecting chunks.
///
/// Returns an empty vector when the input is all whitespace.
pub fn chunk_text(
    text: &str,
    max_chars: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    if max_chars == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= max_chars {
        return Err(ChunkingError::OverlapTooLarge);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let sentences = split_sentences(text, max_chars);
    let packed = pack_sentences(sentences, max_chars);
    let overlapped = apply_overlap(packed, max_chars, overlap);

    Ok(overlapped
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { text, index })
        .collect())
}

/// Segment text into trimmed sentences, hard-splitting any that exceed the budget.
fn split_sentences(text: &str, max_chars: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    for sentence in text.unicode_sentences() {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        if char_len(trimmed) <= max_chars {
            sentences.push(trimmed.to_string());
        } else {
            sentences.extend(hard_split(trimmed, max_chars));
        }
    }
    sentences
}

fn hard_split(sentence: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Pack sentences greedily into chunks of at most `max_chars` characters.
fn pack_sentences(sentences: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        let separator = usize::from(!current.is_empty());
        if !current.is_empty() && char_len(&current) + separator + char_len(&sentence) > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Prepend the tail of each previous chunk onto the next one.
///
/// The combined chunk is trimmed from the front to stay within
/// `max_chars + overlap` characters.
fn apply_overlap(chunks: Vec<String>, max_chars: usize, overlap: usize) -> Vec<String> {
    let effective = overlap.min(max_chars.saturating_sub(1));
    if effective == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut iter = chunks.into_iter();
    let mut previous = iter
        .next()
        .expect("chunks iterator yielded zero elements despite length guard");
    overlapped.push(previous.clone());

    for current in iter {
        let tail = overlap_tail(&previous, effective);
        let mut combined = String::with_capacity(tail.len() + current.len() + 1);
        if !tail.is_empty() {
            combined.push_str(tail);
            combined.push(' ');
        }
        combined.push_str(&current);
        overlapped.push(trim_to_char_budget(combined, max_chars + effective));
        previous = current;
    }

    overlapped
}

/// Last `limit` characters of `text`, preferring to start at a word boundary.
fn overlap_tail(text: &str, limit: usize) -> &str {
    if limit == 0 {
        return "";
    }
    let total = char_len(text);
    if total <= limit {
        return text.trim_start();
    }

    let skip = total - limit;
    let byte_start = text
        .char_indices()
        .nth(skip)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    let tail = &text[byte_start..];
    match tail.find(|c: char| c.is_whitespace()) {
        Some(position) => tail[position..].trim_start(),
        None => tail,
    }
}

fn trim_to_char_budget(text: String, budget: usize) -> String {
    let total = char_len(&text);
    if total <= budget {
        return text;
    }
    let skip = total - budget;
    let byte_start = text
        .char_indices()
        .nth(skip)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    text[byte_start..].trim_start().to_string()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
