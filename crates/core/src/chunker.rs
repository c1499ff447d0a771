//! Fixed-size sliding-window chunking.
//!
//! Offsets are character (Unicode scalar) positions, so `start`/`end` never
//! split a multi-byte character.

use crate::config::ChunkingConfig;
use crate::error::BuildError;
use crate::models::{DocumentRecord, IndexedChunk};
use std::iter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.chunk_size == 0 {
            return Err(BuildError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(BuildError::Config(
                "chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        Ok(())
    }
}

/// Splits `text` into windows of `chunk_size` chars, each starting
/// `chunk_overlap` chars before the previous one ended. The last window may be
/// shorter and is never followed by a duplicate.
pub fn chunk_text(text: &str, cfg: &ChunkingConfig) -> Result<Vec<TextSpan>, BuildError> {
    cfg.validate()?;
    Ok(windows(text, cfg.chunk_size, cfg.chunk_overlap))
}

fn windows(text: &str, size: usize, overlap: usize) -> Vec<TextSpan> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(iter::once(text.len()))
        .collect();
    let length = bounds.len() - 1;

    let mut spans = Vec::new();
    let mut start = 0;
    while start < length {
        let end = (start + size).min(length);
        spans.push(TextSpan {
            text: text[bounds[start]..bounds[end]].to_string(),
            start,
            end,
        });
        if end == length {
            break;
        }
        start = end - overlap;
    }
    spans
}

/// Chunks every document in order. Text is trimmed first; documents left
/// empty produce no chunks.
pub fn chunk_documents(
    documents: &[DocumentRecord],
    cfg: &ChunkingConfig,
) -> Result<Vec<IndexedChunk>, BuildError> {
    cfg.validate()?;
    let mut chunks: Vec<IndexedChunk> = Vec::new();
    for doc in documents {
        let text = doc.text.trim();
        if text.is_empty() {
            continue;
        }
        for (idx, span) in windows(text, cfg.chunk_size, cfg.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            let chunk_id = if doc.doc_id.is_empty() {
                format!("chunk-{}", chunks.len())
            } else {
                format!("{}-{}", doc.doc_id, idx)
            };
            chunks.push(IndexedChunk {
                chunk_id,
                doc_id: doc.doc_id.clone(),
                title: doc.title.clone(),
                source_path: doc.source_path.clone(),
                text: span.text,
                start: span.start,
                end: span.end,
            });
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    fn doc(doc_id: &str, text: &str) -> DocumentRecord {
        DocumentRecord {
            doc_id: doc_id.into(),
            title: "T".into(),
            source_path: "t.md".into(),
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn ten_chars_size_four_overlap_one() {
        let spans = chunk_text("ABCDEFGHIJ", &cfg(4, 1)).unwrap();
        let got: Vec<(&str, usize, usize)> = spans
            .iter()
            .map(|s| (s.text.as_str(), s.start, s.end))
            .collect();
        assert_eq!(got, vec![("ABCD", 0, 4), ("DEFG", 3, 7), ("GHIJ", 6, 10)]);
    }

    #[test]
    fn invalid_parameters_fail_before_chunking() {
        assert!(matches!(
            chunk_text("abc", &cfg(0, 0)),
            Err(BuildError::Config(_))
        ));
        assert!(matches!(
            chunk_text("abc", &cfg(4, 4)),
            Err(BuildError::Config(_))
        ));
        assert!(matches!(
            chunk_documents(&[], &cfg(2, 5)),
            Err(BuildError::Config(_))
        ));
    }

    #[test]
    fn spans_cover_text_without_gaps() {
        let text: String = "The quick brown fox jumps over the lazy dog. ".repeat(7);
        let length = text.chars().count();
        for size in 1..12 {
            for overlap in 0..size {
                let spans = chunk_text(&text, &cfg(size, overlap)).unwrap();
                assert_eq!(spans[0].start, 0);
                assert_eq!(spans.last().unwrap().end, length);
                for pair in spans.windows(2) {
                    assert!(pair[1].start <= pair[0].end, "gap at {:?}", pair);
                    assert!(pair[1].start > pair[0].start);
                }
                for s in &spans {
                    assert!(s.end - s.start <= size);
                    assert!(s.start < s.end);
                    assert_eq!(s.text.chars().count(), s.end - s.start);
                }
            }
        }
    }

    #[test]
    fn short_text_is_one_chunk_and_empty_is_none() {
        let spans = chunk_text("abc", &cfg(10, 3)).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (0, 3));
        assert!(chunk_text("", &cfg(10, 3)).unwrap().is_empty());
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let spans = chunk_text("héllo wörld", &cfg(4, 0)).unwrap();
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["héll", "o wö", "rld"]);
        assert_eq!(spans[2].end, 11);
    }

    #[test]
    fn chunk_ids_use_doc_id_or_running_count() {
        let docs = vec![
            doc("abc", "ABCDEFGHIJ"),
            doc("", "   \n\t "),
            doc("", "KLMNOP"),
        ];
        let chunks = chunk_documents(&docs, &cfg(4, 1)).unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["abc-0", "abc-1", "abc-2", "chunk-3", "chunk-4"]);
        assert_eq!(chunks[3].text, "KLMN");
        assert_eq!(chunks[4].text, "NOP");
    }

    #[test]
    fn chunking_is_deterministic_and_trims_text() {
        let docs = vec![doc("d", "  padded body text  ")];
        let a = chunk_documents(&docs, &cfg(5, 2)).unwrap();
        let b = chunk_documents(&docs, &cfg(5, 2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].text, "padde");
        assert_eq!(a[0].start, 0);
    }
}
