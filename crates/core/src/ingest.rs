//! Turns a directory of plain-text documents into `kb.jsonl` records, and
//! reads those records back for the index build.

use crate::error::BuildError;
use crate::models::{DocumentRecord, UNTITLED};
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions picked up by discovery. PDFs are discovered but their text
/// extraction lives outside this crate, so they are counted as skipped.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// Supported files under `base`, sorted by path. Hidden entries and
/// `excludes` matches are not descended into.
pub fn discover_documents(base: &Path, excludes: &[String]) -> Result<Vec<PathBuf>, BuildError> {
    if !base.exists() {
        return Ok(Vec::new());
    }
    let exclude_set = build_globset(excludes)?;
    let mut found = Vec::new();
    for entry in WalkDir::new(base)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || should_descend(e.path(), &exclude_set))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && has_extension(path, SUPPORTED_EXTENSIONS) {
            found.push(path.to_path_buf());
        }
    }
    Ok(found)
}

/// Normalizes one raw file. Returns `None` when no text can be extracted.
pub fn build_document(raw_path: &Path, base: &Path) -> Result<Option<DocumentRecord>, BuildError> {
    if !has_extension(raw_path, TEXT_EXTENSIONS) {
        return Ok(None);
    }
    let bytes = fs::read(raw_path)?;
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    if text.is_empty() {
        return Ok(None);
    }

    let relative = raw_path.strip_prefix(base).unwrap_or(raw_path);
    let source_path = relative.to_string_lossy().replace('\\', "/");
    let doc_id = blake3::hash(source_path.as_bytes()).to_hex().to_string();
    let created_at = fs::metadata(raw_path)?
        .modified()
        .map(|t| DateTime::<Local>::from(t).to_rfc3339())
        .unwrap_or_default();
    let stem = raw_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Some(DocumentRecord {
        doc_id,
        title: title_from_stem(&stem),
        source_path,
        text,
        created_at,
        risk_level: "medium".into(),
    }))
}

/// Processes every supported document under `base` into `output`.
pub fn ingest_documents(
    base: &Path,
    output: &Path,
    excludes: &[String],
) -> Result<IngestSummary, BuildError> {
    let paths = discover_documents(base, excludes)?;
    let mut summary = IngestSummary::default();
    let mut records = Vec::new();
    for path in &paths {
        match build_document(path, base)? {
            Some(doc) => records.push(doc),
            None => {
                debug!(path = %path.display(), "no extractable text");
                summary.skipped += 1;
            }
        }
    }
    summary.processed = records.len();

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(fs::File::create(output)?);
    for record in &records {
        serde_json::to_writer(&mut w, record)?;
        w.write_all(b"\n")?;
    }
    w.flush()?;

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        output = %output.display(),
        "ingest complete"
    );
    Ok(summary)
}

/// Reads JSONL document records. Malformed lines are skipped.
pub fn load_kb(kb_path: &Path) -> Result<Vec<DocumentRecord>, BuildError> {
    if !kb_path.is_file() {
        return Err(BuildError::MissingSource(kb_path.to_path_buf()));
    }
    let reader = BufReader::new(fs::File::open(kb_path)?);
    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in reader.split(b'\n') {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<DocumentRecord>(&line) {
            Ok(doc) => records.push(doc),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, path = %kb_path.display(), "skipped malformed document lines");
    }
    Ok(records)
}

/// `my_notes-v2` → `My Notes-V2`; empty stems become the placeholder title.
pub fn title_from_stem(stem: &str) -> String {
    let spaced = stem.replace('_', " ");
    let trimmed = spaced.trim();
    if trimmed.is_empty() {
        return UNTITLED.to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut prev_alpha = false;
    for c in trimmed.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, BuildError> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)
            .map_err(|e| BuildError::Config(format!("bad exclude pattern {}: {}", pat, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| BuildError::Config(format!("exclude patterns: {}", e)))
}

fn should_descend(path: &Path, excludes: &GlobSet) -> bool {
    !is_hidden(path) && !excludes.is_match(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
