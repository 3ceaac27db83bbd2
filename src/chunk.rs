//! Paragraph-boundary text chunker.
//!
//! Splits corpus document text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`),
//! falling back to line and then word boundaries for oversized paragraphs.
//! Rendered tables are one paragraph per sheet, so a long sheet is cut
//! between rows.
//!
//! Chunk ids are derived from the document key and index, so rebuilding an
//! index over the same corpus yields the same ids. Each chunk also carries
//! a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks of at most `max_tokens` (approximate tokens).
///
/// Chunk indices are contiguous from 0. Empty text yields one empty chunk;
/// [`crate::index::build_index`] drops blank chunks before embedding.
pub fn chunk_text(document_key: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let body = text.trim();
    if body.is_empty() {
        return vec![make_chunk(document_key, 0, "")];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut pending = String::new();

    for para in body.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if para.len() > max_chars {
            flush(&mut pending, &mut pieces);
            pieces.extend(split_oversized(para, max_chars).into_iter().map(str::to_string));
            continue;
        }
        if !pending.is_empty() && pending.len() + 2 + para.len() > max_chars {
            flush(&mut pending, &mut pieces);
        }
        if !pending.is_empty() {
            pending.push_str("\n\n");
        }
        pending.push_str(para);
    }
    flush(&mut pending, &mut pieces);

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_key, i as i64, piece))
        .collect()
}

fn flush(pending: &mut String, pieces: &mut Vec<String>) {
    if !pending.is_empty() {
        pieces.push(std::mem::take(pending));
    }
}

/// Cut one paragraph into pieces of at most `max_chars` bytes, preferring
/// line breaks, then spaces.
fn split_oversized(para: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = para;
    while !rest.is_empty() {
        let limit = floor_char_boundary(rest, max_chars);
        let cut = if limit < rest.len() {
            let window = &rest[..limit];
            window
                .rfind('\n')
                .or_else(|| window.rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        rest = &rest[cut..];
    }
    out
}

/// Largest byte index `<= max` that falls on a char boundary (at least one char).
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        s.chars().next().map(|c| c.len_utf8()).unwrap_or(s.len())
    } else {
        idx
    }
}

fn make_chunk(document_key: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id_seed = format!("{}#{}", document_key, index);
    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_URL, id_seed.as_bytes()).to_string(),
        document_key: document_key.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].document_key, "doc1");
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text("doc1", "", 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_multiple_paragraphs_exceed_limit() {
        // max_tokens=5 => max_chars=20
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("doc1", text, 5);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_table_rows_split_on_newlines() {
        let rows: Vec<String> = (0..40).map(|i| format!("row{} | value{}", i, i)).collect();
        let text = rows.join("\n");
        let chunks = chunk_text("Grid.xlsx", &text, 20);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.starts_with("row"), "chunk cut mid-row: {:?}", c.text);
        }
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "飞书知识库".repeat(100);
        let chunks = chunk_text("doc1", &text, 3);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_deterministic_ids_and_hashes() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 2);
        let c2 = chunk_text("doc1", text, 2);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.text, b.text);
        }
        assert_ne!(c1[0].id, chunk_text("doc2", text, 2)[0].id);
    }
}
