use serde::{Deserialize, Deserializer, Serialize};
use storage::ChunkMetadata;

pub const UNTITLED: &str = "Untitled";

/// One normalized document, as produced by ingestion (one JSON line each).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default, deserialize_with = "nullable")]
    pub doc_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub risk_level: String,
}

fn nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A chunk produced by the chunker, before it is assigned a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    pub source_path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl IndexedChunk {
    pub fn into_metadata(self, position: usize, model_name: &str) -> ChunkMetadata {
        ChunkMetadata {
            position,
            chunk_id: self.chunk_id,
            doc_id: self.doc_id,
            title: self.title,
            source_path: self.source_path,
            text: self.text,
            start: self.start,
            end: self.end,
            model_name: model_name.to_string(),
            build_id: None,
        }
    }
}

/// A chunk returned by retrieval, with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub title: String,
    pub source_path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

impl RetrievedChunk {
    pub fn from_metadata(record: &ChunkMetadata, score: f32) -> Self {
        let title = if record.title.is_empty() {
            UNTITLED.to_string()
        } else {
            record.title.clone()
        };
        Self {
            chunk_id: record.chunk_id.clone(),
            doc_id: record.doc_id.clone(),
            title,
            source_path: record.source_path.clone(),
            text: record.text.clone(),
            start: record.start,
            end: record.end,
            score,
        }
    }

    /// `[title — source]`, or `[title]` when the source path is unknown.
    pub fn label(&self) -> String {
        let title = if self.title.is_empty() {
            UNTITLED
        } else {
            self.title.as_str()
        };
        if self.source_path.is_empty() {
            format!("[{}]", title)
        } else {
            format!("[{} — {}]", title, self.source_path)
        }
    }

    pub fn snippet(&self) -> String {
        format!("{} (score={:.3}) {}", self.label(), self.score, self.text.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str, source: &str) -> ChunkMetadata {
        ChunkMetadata {
            position: 0,
            chunk_id: "d-0".into(),
            doc_id: "d".into(),
            title: title.into(),
            source_path: source.into(),
            text: "  body text \n".into(),
            start: 0,
            end: 13,
            model_name: "m".into(),
            build_id: None,
        }
    }

    #[test]
    fn label_falls_back_to_title_then_placeholder() {
        let full = RetrievedChunk::from_metadata(&meta("Guide", "docs/guide.md"), 0.5);
        assert_eq!(full.label(), "[Guide — docs/guide.md]");

        let no_source = RetrievedChunk::from_metadata(&meta("Guide", ""), 0.5);
        assert_eq!(no_source.label(), "[Guide]");

        let bare = RetrievedChunk::from_metadata(&meta("", ""), 0.5);
        assert_eq!(bare.title, UNTITLED);
        assert_eq!(bare.label(), "[Untitled]");
    }

    #[test]
    fn snippet_trims_text_and_rounds_score() {
        let chunk = RetrievedChunk::from_metadata(&meta("Guide", "g.md"), 0.87654);
        assert_eq!(chunk.snippet(), "[Guide — g.md] (score=0.877) body text");
    }

    #[test]
    fn document_fields_tolerate_null_and_absence() {
        let doc: DocumentRecord =
            serde_json::from_str(r#"{"doc_id":null,"text":"hello","title":"T"}"#).unwrap();
        assert_eq!(doc.doc_id, "");
        assert_eq!(doc.text, "hello");
        assert_eq!(doc.source_path, "");
    }
}
