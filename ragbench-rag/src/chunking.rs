//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and five implementations:
//!
//! - [`FixedSizeChunker`] — disjoint windows of a fixed character count
//! - [`SlidingWindowChunker`] — overlapping windows advancing by `size - overlap`
//! - [`SentenceChunker`] — greedy packing of whole sentences under a target size
//! - [`ParagraphChunker`] — one chunk per blank-line separated paragraph
//! - [`RecursiveChunker`] — splits hierarchically by paragraphs, sentences, then words
//!
//! All sizes are counted in Unicode scalar values, never bytes, so CJK text
//! is windowed the same way as ASCII.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations are pure functions of their input: the same text always
/// yields the same chunk sequence.
pub trait Chunker: Send + Sync {
    /// Short label for this strategy, used in reports.
    fn name(&self) -> &str;

    /// Split raw text into ordered chunk texts.
    fn split(&self, text: &str) -> Vec<String>;

    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk::from_document(document, i, text))
            .collect()
    }
}

/// Byte offsets of every char start in `text`, followed by `text.len()`.
fn char_offsets(text: &str) -> Vec<usize> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    offsets
}

fn require_size(size: usize, what: &str) -> Result<()> {
    if size == 0 {
        return Err(RagError::ConfigError(format!("{what} must be greater than zero")));
    }
    Ok(())
}

/// Splits text into disjoint windows of `size` characters.
///
/// For input of `L` characters this yields `ceil(L / size)` chunks whose
/// concatenation is exactly the input; only the last may be shorter.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    size: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `size == 0`.
    pub fn new(size: usize) -> Result<Self> {
        require_size(size, "chunk size")?;
        Ok(Self { size })
    }
}

impl Chunker for FixedSizeChunker {
    fn name(&self) -> &str {
        "fixed_size"
    }

    fn split(&self, text: &str) -> Vec<String> {
        let offsets = char_offsets(text);
        let char_count = offsets.len() - 1;
        (0..char_count)
            .step_by(self.size)
            .map(|start| {
                let end = (start + self.size).min(char_count);
                text[offsets[start]..offsets[end]].to_string()
            })
            .collect()
    }
}

/// Character ranges `(start, end)` of the sliding windows over `char_count` characters.
///
/// Windows advance by `size - overlap`, clamped to at least one character so
/// the walk always terminates. The walk stops once the text remaining past the
/// current window is no longer than `overlap`, so the final `overlap`
/// characters may be left without a full window of their own.
pub fn sliding_window_spans(
    char_count: usize,
    size: usize,
    overlap: usize,
) -> Vec<(usize, usize)> {
    if char_count == 0 || size == 0 {
        return Vec::new();
    }
    if char_count <= size {
        return vec![(0, char_count)];
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        spans.push((start, end));
        if start + size + overlap >= char_count {
            break;
        }
        start += step;
    }
    spans
}

/// Splits text into overlapping windows of `size` characters.
///
/// Windows start every `size - overlap` characters. Text no longer than
/// `size` comes back as a single chunk. Iteration ends as soon as at most
/// `overlap` characters remain beyond the current window, which means the
/// tail of the text is only covered through the overlap of the last window:
///
/// ```rust
/// use ragbench_rag::chunking::{Chunker, SlidingWindowChunker};
///
/// let chunker = SlidingWindowChunker::new(4, 2).unwrap();
/// assert_eq!(chunker.split("ABCDEFGHIJ"), ["ABCD", "CDEF", "EFGH"]);
/// ```
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    size: usize,
    overlap: usize,
}

impl SlidingWindowChunker {
    /// Create a new `SlidingWindowChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `size == 0` or `overlap >= size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        require_size(size, "window size")?;
        if overlap >= size {
            return Err(RagError::ConfigError(format!(
                "overlap ({overlap}) must be less than window size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }
}

impl Chunker for SlidingWindowChunker {
    fn name(&self) -> &str {
        "sliding_window"
    }

    fn split(&self, text: &str) -> Vec<String> {
        let offsets = char_offsets(text);
        sliding_window_spans(offsets.len() - 1, self.size, self.overlap)
            .into_iter()
            .map(|(start, end)| text[offsets[start]..offsets[end]].to_string())
            .collect()
    }
}

fn is_cjk_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_ascii_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into sentences, keeping terminal punctuation (and any
/// whitespace that follows it) attached to the preceding sentence.
///
/// `。！？` always end a sentence. `.!?` only end one when followed by
/// whitespace or the end of the text, so `3.14` stays intact.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut sentence_start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let ends_sentence = is_cjk_terminal(c)
            || (is_ascii_terminal(c)
                && next.is_none_or(|n| n.is_whitespace() || is_ascii_terminal(n)));

        if !ends_sentence {
            i += 1;
            continue;
        }

        // absorb runs like "?!" or "。。" and the whitespace after them
        let mut j = i + 1;
        while j < chars.len() && (is_cjk_terminal(chars[j].1) || is_ascii_terminal(chars[j].1)) {
            j += 1;
        }
        while j < chars.len() && chars[j].1.is_whitespace() {
            j += 1;
        }
        let end = chars.get(j).map_or(text.len(), |(offset, _)| *offset);
        sentences.push(&text[sentence_start..end]);
        sentence_start = end;
        i = j;
    }

    if sentence_start < text.len() {
        sentences.push(&text[sentence_start..]);
    }
    sentences
}

/// Packs whole sentences into chunks of at most `target_size` characters.
///
/// Sentences are appended to a running buffer until the next one would push
/// it past `target_size`; the buffer is then flushed and restarted with that
/// sentence. A single sentence longer than `target_size` becomes its own
/// chunk rather than being truncated. Chunks are trimmed of surrounding
/// whitespace and empty chunks are dropped.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    target_size: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `target_size == 0`.
    pub fn new(target_size: usize) -> Result<Self> {
        require_size(target_size, "target size")?;
        Ok(Self { target_size })
    }
}

impl Chunker for SentenceChunker {
    fn name(&self) -> &str {
        "sentence"
    }

    fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();
        let mut buffer_chars = 0;

        let flush = |buffer: &mut String, chunks: &mut Vec<String>| {
            let trimmed = buffer.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            buffer.clear();
        };

        for sentence in split_sentences(text) {
            let sentence_chars = sentence.chars().count();
            if buffer_chars > 0 && buffer_chars + sentence_chars > self.target_size {
                flush(&mut buffer, &mut chunks);
                buffer_chars = 0;
            }
            buffer.push_str(sentence);
            buffer_chars += sentence_chars;
        }
        flush(&mut buffer, &mut chunks);

        chunks
    }
}

/// Splits text at blank lines, one trimmed chunk per non-empty paragraph.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphChunker;

impl Chunker for ParagraphChunker {
    fn name(&self) -> &str {
        "paragraph"
    }

    fn split(&self, text: &str) -> Vec<String> {
        text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect()
    }
}

/// Splits text hierarchically: paragraphs → sentences → words.
///
/// First splits by paragraph separators (`\n\n`). If a paragraph exceeds
/// `chunk_size`, splits by sentence boundaries (`. `, `! `, `? `, `。`). If a
/// sentence still exceeds `chunk_size`, splits by word boundaries, and as a
/// last resort by character windows that overlap by `chunk_overlap`.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        require_size(chunk_size, "chunk size")?;
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }
}

const RECURSIVE_SEPARATORS: [&str; 6] = ["\n\n", "。", ". ", "! ", "? ", " "];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split text by a separator, then merge segments into chunks that respect
/// `chunk_size`. If a segment exceeds `chunk_size`, it is split further
/// using the next-level separator.
fn split_and_merge(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size || separators.is_empty() {
        return split_by_size(text, chunk_size, chunk_overlap);
    }

    let separator = separators[0];
    let remaining_separators = &separators[1..];

    let mut chunks = Vec::new();
    let mut current = String::new();

    let emit = |piece: String, chunks: &mut Vec<String>| {
        if char_len(&piece) > chunk_size {
            chunks.extend(split_and_merge(&piece, chunk_size, chunk_overlap, remaining_separators));
        } else if !piece.trim().is_empty() {
            chunks.push(piece);
        }
    };

    for segment in split_keeping_separator(text, separator) {
        if current.is_empty() {
            current = segment.to_string();
        } else if char_len(&current) + char_len(segment) <= chunk_size {
            current.push_str(segment);
        } else {
            emit(std::mem::take(&mut current), &mut chunks);
            current = segment.to_string();
        }
    }

    if !current.is_empty() {
        emit(current, &mut chunks);
    }

    chunks
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-window splitting with overlap.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let offsets = char_offsets(text);
    let char_count = offsets.len() - 1;
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        chunks.push(text[offsets[start]..offsets[end]].to_string());
        if end == char_count {
            break;
        }
        start += step;
    }

    chunks
}

impl Chunker for RecursiveChunker {
    fn name(&self) -> &str {
        "recursive"
    }

    fn split(&self, text: &str) -> Vec<String> {
        split_and_merge(text, self.chunk_size, self.chunk_overlap, &RECURSIVE_SEPARATORS)
    }
}

/// Serializable choice of chunking strategy with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// See [`FixedSizeChunker`].
    FixedSize {
        /// Characters per chunk.
        size: usize,
    },
    /// See [`SlidingWindowChunker`].
    SlidingWindow {
        /// Characters per window.
        size: usize,
        /// Characters shared by consecutive windows.
        overlap: usize,
    },
    /// See [`SentenceChunker`].
    Sentence {
        /// Soft upper bound on characters per chunk.
        target_size: usize,
    },
    /// See [`ParagraphChunker`].
    Paragraph,
    /// See [`RecursiveChunker`].
    Recursive {
        /// Maximum characters per chunk.
        size: usize,
        /// Overlap used when falling back to character windows.
        overlap: usize,
    },
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        Self::Recursive { size: 300, overlap: 100 }
    }
}

impl ChunkStrategy {
    /// Check the parameters without building a chunker.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for a zero size or an overlap that is
    /// not smaller than the size.
    pub fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }

    /// Build the chunker this strategy describes.
    ///
    /// # Errors
    ///
    /// Same conditions as [`validate`](Self::validate).
    pub fn build(&self) -> Result<Arc<dyn Chunker>> {
        Ok(match *self {
            Self::FixedSize { size } => Arc::new(FixedSizeChunker::new(size)?),
            Self::SlidingWindow { size, overlap } => {
                Arc::new(SlidingWindowChunker::new(size, overlap)?)
            }
            Self::Sentence { target_size } => Arc::new(SentenceChunker::new(target_size)?),
            Self::Paragraph => Arc::new(ParagraphChunker),
            Self::Recursive { size, overlap } => Arc::new(RecursiveChunker::new(size, overlap)?),
        })
    }
}
