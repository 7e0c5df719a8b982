//! Recursive character text splitter.
//!
//! Splits extracted document text into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Splitting prefers the coarsest separator that
//! occurs in the text and only falls back to finer ones for pieces that are
//! still too long:
//!
//! 1. Paragraph breaks (`\n\n`)
//! 2. Line breaks (`\n`)
//! 3. Spaces
//! 4. Individual characters
//!
//! Adjacent small pieces are merged back together until the next one would
//! overflow `chunk_size`; the tail of each emitted chunk (up to
//! `chunk_overlap` characters) is carried into the next one.
//!
//! Lengths are measured in characters, not bytes, so multi-byte text is
//! never cut inside a code point.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::chunk_document;
//!
//! let chunks = chunk_document("notes.md", "Hello world.\n\nSecond paragraph.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use std::collections::VecDeque;

use serde_json::{json, Map};
use sha2::{Digest, Sha256};

use crate::index::{IndexRecord, SOURCE_FIELD};

/// Separators tried from coarsest to finest. The empty separator splits
/// into single characters.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A chunk of a source document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id: SHA-256 of `"{source}:{chunk_index}"`.
    pub id: String,
    /// Source label (the uploaded file name).
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// Convert into an index record tagged with its source label.
    pub fn to_record(&self) -> IndexRecord {
        let mut metadata = Map::new();
        metadata.insert(SOURCE_FIELD.to_string(), json!(self.source));
        metadata.insert("chunk_index".to_string(), json!(self.chunk_index));
        metadata.insert("hash".to_string(), json!(self.hash));
        IndexRecord {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata,
        }
    }
}

/// Split a document into chunks with contiguous indices starting at 0.
///
/// Whitespace-only text yields no chunks.
pub fn chunk_document(
    source: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| make_chunk(source, index, piece))
        .collect()
}

/// Split text into overlapping pieces of at most `chunk_size` characters.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let mut separator = separators.last().copied().unwrap_or("");
    let mut finer: &[&str] = &[];
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            separator = sep;
            break;
        }
        if text.contains(sep) {
            separator = sep;
            finer = &separators[i + 1..];
            break;
        }
    }

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    };

    let mut out = Vec::new();
    let mut small: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) < chunk_size {
            small.push(piece);
            continue;
        }
        if !small.is_empty() {
            out.extend(merge_pieces(&small, separator, chunk_size, chunk_overlap));
            small.clear();
        }
        if finer.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else {
            out.extend(split_recursive(piece, finer, chunk_size, chunk_overlap));
        }
    }
    if !small.is_empty() {
        out.extend(merge_pieces(&small, separator, chunk_size, chunk_overlap));
    }
    out
}

/// Greedily join pieces with `separator`, carrying up to `chunk_overlap`
/// characters of trailing pieces into the next chunk.
fn merge_pieces(
    pieces: &[&str],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let joiner = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { sep_len };
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len + joiner(&current) > chunk_size && !current.is_empty() {
            push_joined(&mut docs, &current, separator);
            while total > chunk_overlap
                || (total > 0 && total + len + joiner(&current) > chunk_size)
            {
                let Some(front) = current.pop_front() else {
                    break;
                };
                total -= char_len(front) + joiner(&current);
            }
        }
        total += len + joiner(&current);
        current.push_back(piece);
    }
    push_joined(&mut docs, &current, separator);
    docs
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(source: &str, index: usize, text: String) -> Chunk {
    Chunk {
        id: sha256_hex(&format!("{}:{}", source, index)),
        source: source.to_string(),
        chunk_index: index,
        hash: sha256_hex(&text),
        text,
    }
}
