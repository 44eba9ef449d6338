//! Overlapping, boundary-aware text chunker.
//!
//! Splits page text into spans of at most `max_size` chars. Each span after
//! the first repeats the tail of its predecessor so that an answer sitting
//! on a chunk boundary is still retrievable from a single chunk.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `max_size` chars, emit it and stop.
//! 2. Otherwise look at the window `[start, start + max_size)` and pick the
//!    last cut point not earlier than `start + max(overlap + 1, max_size / 2)`,
//!    trying in order: paragraph break (`\n\n`), line break, sentence end,
//!    whitespace. If none qualifies, hard-cut at `max_size`.
//! 3. The next span starts `overlap` chars before the cut, snapped forward to
//!    the first word start inside the overlap region when there is one.
//!
//! The cut always lies beyond `start + overlap`, so every span contributes
//! new text and the iteration terminates.
//!
//! # Example
//!
//! ```rust
//! use pdf_rag_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let spans: Vec<_> = chunker.spans("Hello world.").collect();
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].text, "Hello world.");
//! ```

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Chunk;

/// Separators that end a sentence; the cut lands after the trailing space.
const SENTENCE_ENDS: &[&str] = &[". ", "! ", "? ", "; "];

/// Invalid chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk max size must be > 0")]
    ZeroMaxSize,
    #[error("chunk overlap ({overlap}) must be smaller than max size ({max_size})")]
    OverlapTooLarge { max_size: usize, overlap: usize },
}

/// Validated chunking parameters. Sizes are counted in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails fast when `overlap >= max_size` or `max_size == 0`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if max_size == 0 {
            return Err(ChunkError::ZeroMaxSize);
        }
        if overlap >= max_size {
            return Err(ChunkError::OverlapTooLarge { max_size, overlap });
        }
        Ok(Self { max_size, overlap })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split `text` into spans. The returned iterator is `Clone`, so a
    /// sequence can be restarted from any point without recomputing it.
    pub fn spans<'a>(&self, text: &'a str) -> Spans<'a> {
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        Spans {
            text,
            bounds,
            start: 0,
            max_size: self.max_size,
            overlap: self.overlap,
            done: false,
        }
    }

    /// Chunk one page of a document into [`Chunk`]s.
    ///
    /// Whitespace-only spans are skipped. Chunk indices continue from
    /// `first_index` so that indices stay contiguous across the pages of a
    /// document.
    pub fn chunk_page(
        &self,
        document_id: &str,
        page: u32,
        text: &str,
        first_index: i64,
    ) -> Vec<Chunk> {
        self.spans(text)
            .filter(|span| !span.text.trim().is_empty())
            .enumerate()
            .map(|(i, span)| make_chunk(document_id, page, first_index + i as i64, span))
            .collect()
    }
}

/// Split `text` into [`Chunk`]s with a one-off [`Chunker`].
pub fn chunk_text(
    document_id: &str,
    page: u32,
    text: &str,
    max_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    Ok(Chunker::new(max_size, overlap)?.chunk_page(document_id, page, text, 0))
}

/// A borrowed slice of the input plus its char offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    pub text: &'a str,
    pub char_offset: usize,
}

/// Iterator over the spans of one text. See [`Chunker::spans`].
#[derive(Debug, Clone)]
pub struct Spans<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` as a sentinel.
    bounds: Vec<usize>,
    start: usize,
    max_size: usize,
    overlap: usize,
    done: bool,
}

impl<'a> Spans<'a> {
    fn char_count(&self) -> usize {
        self.bounds.len() - 1
    }

    fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.text[self.bounds[from]..self.bounds[to]]
    }

    fn char_at(&self, idx: usize) -> Option<char> {
        if idx >= self.char_count() {
            return None;
        }
        self.slice(idx, idx + 1).chars().next()
    }

    /// Best cut in `(floor, hard_end]`, as a char index.
    fn cut_point(&self, start: usize, hard_end: usize) -> usize {
        let floor = start + (self.overlap + 1).max(self.max_size / 2);
        let base = self.bounds[start];
        let window = self.slice(start, hard_end);

        let candidates = [
            last_cut_after(window, &["\n\n"]),
            last_cut_after(window, &["\n"]),
            last_cut_after(window, SENTENCE_ENDS),
            window
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, c)| i + c.len_utf8()),
        ];

        for cut in candidates.into_iter().flatten() {
            if let Ok(idx) = self.bounds.binary_search(&(base + cut)) {
                if idx >= floor {
                    return idx;
                }
            }
        }
        hard_end
    }

    /// Where the span following a cut at `end` begins.
    fn next_start(&self, end: usize) -> usize {
        if self.overlap == 0 {
            return end;
        }
        let raw = end - self.overlap;
        (raw..end)
            .find(|&p| {
                self.char_at(p - 1).is_some_and(char::is_whitespace)
                    && !self.char_at(p).is_some_and(char::is_whitespace)
            })
            .unwrap_or(raw)
    }
}

impl<'a> Iterator for Spans<'a> {
    type Item = TextSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.char_count();
        if self.done || self.start >= n {
            return None;
        }

        let start = self.start;
        let end = if n - start <= self.max_size {
            n
        } else {
            self.cut_point(start, start + self.max_size)
        };

        if end == n {
            self.done = true;
        } else {
            self.start = self.next_start(end);
        }

        Some(TextSpan {
            text: self.slice(start, end),
            char_offset: start,
        })
    }
}

/// Byte position just past the last occurrence of any separator.
fn last_cut_after(window: &str, separators: &[&str]) -> Option<usize> {
    separators
        .iter()
        .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
        .max()
}

fn make_chunk(document_id: &str, page: u32, index: i64, span: TextSpan<'_>) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(span.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        page,
        chunk_index: index,
        char_offset: span.char_offset,
        text: span.text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunker: &Chunker, text: &str) -> Vec<String> {
        chunker.spans(text).map(|s| s.text.to_string()).collect()
    }

    fn long_text() -> String {
        (0..60)
            .map(|i| {
                format!(
                    "Sentence number {} talks about topic {} in some detail.",
                    i,
                    i % 7
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let text = "The capital of France is Paris.";
        assert_eq!(texts(&chunker, text), vec![text.to_string()]);
    }

    #[test]
    fn test_exact_max_size_single_chunk() {
        let chunker = Chunker::new(10, 3).unwrap();
        assert_eq!(texts(&chunker, "0123456789"), vec!["0123456789"]);
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert_eq!(chunker.spans("").count(), 0);
        assert!(chunker.chunk_page("doc", 1, "", 0).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        assert_eq!(Chunker::new(0, 0), Err(ChunkError::ZeroMaxSize));
        assert_eq!(
            Chunker::new(100, 100),
            Err(ChunkError::OverlapTooLarge {
                max_size: 100,
                overlap: 100
            })
        );
        assert!(chunk_text("doc", 1, "abc", 10, 20).is_err());
    }

    #[test]
    fn test_chunks_respect_max_size() {
        let chunker = Chunker::new(120, 30).unwrap();
        let text = long_text();
        let spans = texts(&chunker, &text);
        assert!(spans.len() > 1);
        for s in &spans {
            assert!(s.chars().count() <= 120, "chunk too long: {:?}", s);
        }
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let chunker = Chunker::new(120, 30).unwrap();
        let text = long_text();
        let spans = texts(&chunker, &text);
        for pair in spans.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let shared = (1..=30).rev().find(|&k| {
                let prev_chars: Vec<char> = prev.chars().collect();
                if k > prev_chars.len() {
                    return false;
                }
                let suffix: String = prev_chars[prev_chars.len() - k..].iter().collect();
                next.starts_with(&suffix)
            });
            assert!(
                shared.is_some(),
                "no overlap between {:?} and {:?}",
                prev,
                next
            );
        }
    }

    #[test]
    fn test_hard_cut_overlap_is_exact() {
        let chunker = Chunker::new(10, 4).unwrap();
        let spans = texts(&chunker, "abcdefghijklmnopqrstuvwxyz");
        assert_eq!(spans[0], "abcdefghij");
        assert_eq!(spans[1], "ghijklmnop");
        assert_eq!(spans.last().unwrap(), "stuvwxyz");
    }

    #[test]
    fn test_zero_overlap_partitions_text() {
        let chunker = Chunker::new(10, 0).unwrap();
        let text = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(texts(&chunker, text).concat(), text);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let chunker = Chunker::new(40, 5).unwrap();
        let text = "First paragraph is here.\n\nSecond paragraph follows with more words.";
        let spans = texts(&chunker, text);
        assert_eq!(spans[0], "First paragraph is here.\n\n");
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let chunker = Chunker::new(50, 5).unwrap();
        let text = "One short sentence is here. Another sentence keeps on going past the limit.";
        let spans = texts(&chunker, text);
        assert_eq!(spans[0], "One short sentence is here. ");
    }

    #[test]
    fn test_multibyte_chars() {
        let chunker = Chunker::new(8, 2).unwrap();
        let text = "┌──────────────────┐\n│ Hello wörld │\n└──────────────────┘";
        let spans = texts(&chunker, text);
        assert!(spans.len() > 1);
        for s in &spans {
            assert!(s.chars().count() <= 8);
        }
    }

    #[test]
    fn test_restartable() {
        let chunker = Chunker::new(50, 10).unwrap();
        let text = long_text();
        let mut iter = chunker.spans(&text);
        iter.next();
        let resumed = iter.clone();
        assert_eq!(iter.collect::<Vec<_>>(), resumed.collect::<Vec<_>>());
    }

    #[test]
    fn test_chunk_page_metadata() {
        let chunker = Chunker::new(60, 10).unwrap();
        let text = long_text();
        let chunks = chunker.chunk_page("report.pdf", 3, &text, 7);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, 7 + i as i64);
            assert_eq!(c.page, 3);
            assert_eq!(c.document_id, "report.pdf");
            assert_eq!(c.hash.len(), 64);
        }
        assert_eq!(chunks[0].char_offset, 0);
    }

    #[test]
    fn test_whitespace_only_page_yields_nothing() {
        let chunker = Chunker::new(60, 10).unwrap();
        assert!(chunker.chunk_page("doc", 1, "  \n\n \t ", 0).is_empty());
    }

    #[test]
    fn test_deterministic_text_and_hash() {
        let text = long_text();
        let a = chunk_text("doc", 1, &text, 80, 20).unwrap();
        let b = chunk_text("doc", 1, &text, 80, 20).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.hash, y.hash);
            assert_ne!(x.id, y.id);
        }
    }
}
