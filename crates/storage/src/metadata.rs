//! Line-delimited chunk metadata, one JSON object per vector row.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub position: usize,
    pub chunk_id: String,
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
}

/// Loaded metadata, addressable by vector row.
///
/// Records sit at the slot named by their own `position`, so a line that
/// failed to parse leaves a hole rather than shifting later rows.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    slots: Vec<Option<ChunkMetadata>>,
    skipped: usize,
}

impl MetadataStore {
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mut parsed = Vec::new();
        let mut lines = 0usize;
        let mut skipped = 0usize;
        for line in BufReader::new(file).split(b'\n') {
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            lines += 1;
            match serde_json::from_slice::<ChunkMetadata>(&line) {
                Ok(record) => parsed.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(line = lines, error = %e, "skipping malformed metadata line");
                }
            }
        }

        let mut slots: Vec<Option<ChunkMetadata>> = vec![None; lines];
        for record in parsed {
            let position = record.position;
            match slots.get_mut(position) {
                Some(slot) if slot.is_none() => *slot = Some(record),
                Some(_) => {
                    skipped += 1;
                    warn!(position, "duplicate metadata position, keeping first record");
                }
                None => {
                    skipped += 1;
                    warn!(position, lines, "metadata position out of range");
                }
            }
        }
        // Holes at the tail carry no information.
        while matches!(slots.last(), Some(None)) {
            slots.pop();
        }
        Ok(Self { slots, skipped })
    }

    /// Writes `records` as JSON lines. Record `i` must carry `position == i`.
    pub fn write<W: Write>(w: &mut W, records: &[ChunkMetadata]) -> Result<()> {
        for (line, record) in records.iter().enumerate() {
            if record.position != line {
                return Err(StorageError::PositionMismatch {
                    line,
                    position: record.position,
                });
            }
            serde_json::to_writer(&mut *w, record)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn get(&self, row: usize) -> Option<&ChunkMetadata> {
        self.slots.get(row).and_then(Option::as_ref)
    }

    /// Number of row slots, holes included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn records(&self) -> impl Iterator<Item = &ChunkMetadata> {
        self.slots.iter().flatten()
    }

    /// Lines dropped while loading (unparseable, duplicate, or out of range).
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Model recorded on the first present record.
    pub fn model_name(&self) -> Option<&str> {
        self.records().next().map(|r| r.model_name.as_str())
    }
}
