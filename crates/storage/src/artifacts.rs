//! The index/metadata pair: build identity, atomic replacement, verified load.

use crate::metadata::{ChunkMetadata, MetadataStore};
use crate::vector_index::FlatIpIndex;
use crate::{Result, StorageError};
use std::fmt;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "meta.jsonl";

/// Reads of a pair that straddle a concurrent swap are retried this many
/// times before the mismatch is reported.
const OPEN_ATTEMPTS: usize = 3;

static SWAP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            index: dir.join(INDEX_FILE),
            metadata: dir.join(METADATA_FILE),
        }
    }

    pub fn exists(&self) -> bool {
        self.index.is_file() && self.metadata.is_file()
    }
}

/// BLAKE3 digest identifying one build. Stored in the index header and on
/// every metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildId(blake3::Hash);

impl BuildId {
    /// Hashes every row's vector bytes together with its chunk id, text and
    /// model name, in row order.
    pub fn compute(index: &FlatIpIndex, records: &[ChunkMetadata]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(index.dimension() as u64).to_le_bytes());
        hasher.update(&(index.len() as u64).to_le_bytes());
        for (row, record) in records.iter().enumerate() {
            for field in [&record.chunk_id, &record.text, &record.model_name] {
                hasher.update(&(field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
            if let Some(vector) = index.row(row) {
                for value in vector {
                    hasher.update(&value.to_le_bytes());
                }
            }
        }
        Self(hasher.finalize())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Writes `index` and `records` as a new pair and swaps it into `dir`.
///
/// Both files are staged in a sibling directory first; the live directory is
/// only touched once both are fully written, and it is restored if the swap
/// itself fails.
pub fn write_pair(
    dir: &Path,
    index: &FlatIpIndex,
    mut records: Vec<ChunkMetadata>,
) -> Result<BuildId> {
    if records.len() != index.len() {
        return Err(StorageError::RowCountMismatch {
            index: index.len(),
            metadata: records.len(),
        });
    }
    let build_id = BuildId::compute(index, &records);
    let hex = build_id.to_hex();
    for record in &mut records {
        record.build_id = Some(hex.clone());
    }

    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    fs::create_dir_all(&parent)?;
    let staging = sibling_dir(&parent, &name, "staging", &build_id);
    let retired = sibling_dir(&parent, &name, "retired", &build_id);
    remove_if_present(&staging)?;
    remove_if_present(&retired)?;

    if let Err(e) = stage(&staging, index, &records, &build_id) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }
    debug!(staging = %staging.display(), "staged index pair");

    swap_into_place(&staging, &retired, dir)?;
    info!(
        dir = %dir.display(),
        rows = index.len(),
        build = %build_id,
        "index pair written"
    );
    Ok(build_id)
}

/// `.{name}.{kind}-{build}-{pid}-{seq}`: unique per call, so concurrent
/// builds never share a staging or retired directory.
fn sibling_dir(parent: &Path, name: &str, kind: &str, build_id: &BuildId) -> PathBuf {
    let seq = SWAP_SEQ.fetch_add(1, Ordering::Relaxed);
    parent.join(format!(
        ".{}.{}-{}-{}-{}",
        name,
        kind,
        build_id.short(),
        std::process::id(),
        seq
    ))
}

fn stage(
    staging: &Path,
    index: &FlatIpIndex,
    records: &[ChunkMetadata],
    build_id: &BuildId,
) -> Result<()> {
    fs::create_dir_all(staging)?;
    let paths = IndexPaths::new(staging);

    let mut w = BufWriter::new(fs::File::create(&paths.index)?);
    index.write_to(&mut w, build_id)?;
    w.flush()?;
    w.get_ref().sync_all()?;

    let mut w = BufWriter::new(fs::File::create(&paths.metadata)?);
    MetadataStore::write(&mut w, records)?;
    w.flush()?;
    w.get_ref().sync_all()?;
    Ok(())
}

fn swap_into_place(staging: &Path, retired: &Path, dir: &Path) -> Result<()> {
    if !dir.exists() {
        if let Err(e) = fs::rename(staging, dir) {
            let _ = fs::remove_dir_all(staging);
            return Err(e.into());
        }
        return Ok(());
    }
    if let Err(e) = fs::rename(dir, retired) {
        let _ = fs::remove_dir_all(staging);
        return Err(e.into());
    }
    if let Err(e) = fs::rename(staging, dir) {
        if let Err(restore) = fs::rename(retired, dir) {
            warn!(error = %restore, retired = %retired.display(), "failed to restore previous index");
        }
        let _ = fs::remove_dir_all(staging);
        return Err(e.into());
    }
    if let Err(e) = fs::remove_dir_all(retired) {
        warn!(error = %e, retired = %retired.display(), "failed to remove retired index");
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A loaded, verified index/metadata pair. Read-only once opened.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    index: FlatIpIndex,
    metadata: MetadataStore,
    build_id: BuildId,
}

impl IndexSnapshot {
    /// Loads the pair in `dir`.
    ///
    /// Returns `Ok(None)` when either artifact is absent or `index.bin` is
    /// truncated or unreadable as an index; both mean "nothing to search".
    /// A build id mismatch is retried, since a reader can land between the
    /// two reads of a concurrent swap. Only a mismatch that persists, or
    /// metadata naming several models, is an error.
    pub fn open(dir: &Path) -> Result<Option<Self>> {
        let mut attempt = 1;
        loop {
            match Self::read_pair(dir) {
                Err(
                    e @ (StorageError::BuildMismatch { .. }
                    | StorageError::RowCountMismatch { .. }),
                ) if attempt < OPEN_ATTEMPTS => {
                    debug!(
                        attempt,
                        error = %e,
                        dir = %dir.display(),
                        "pair changed while reading, retrying"
                    );
                    attempt += 1;
                }
                Err(StorageError::CorruptIndex(reason)) => {
                    warn!(
                        reason = %reason,
                        dir = %dir.display(),
                        "unreadable index, treating as absent"
                    );
                    return Ok(None);
                }
                other => return other,
            }
        }
    }

    fn read_pair(dir: &Path) -> Result<Option<Self>> {
        let paths = IndexPaths::new(dir);
        if !paths.exists() {
            return Ok(None);
        }
        let bytes = match fs::read(&paths.index) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let metadata = match MetadataStore::load(&paths.metadata) {
            Ok(m) => m,
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let (index, build_id) = FlatIpIndex::from_bytes(&bytes)?;
        verify(&index, &metadata, &build_id)?;
        if metadata.skipped() > 0 {
            warn!(
                skipped = metadata.skipped(),
                dir = %dir.display(),
                "metadata lines skipped while loading"
            );
        }
        Ok(Some(Self {
            index,
            metadata,
            build_id,
        }))
    }

    pub fn index(&self) -> &FlatIpIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn build_id(&self) -> BuildId {
        self.build_id
    }
}

fn verify(index: &FlatIpIndex, metadata: &MetadataStore, build_id: &BuildId) -> Result<()> {
    if metadata.len() > index.len() {
        return Err(StorageError::RowCountMismatch {
            index: index.len(),
            metadata: metadata.len(),
        });
    }
    let expected = build_id.to_hex();
    let mut first_model: Option<&str> = None;
    for record in metadata.records() {
        if record.build_id.as_deref() != Some(expected.as_str()) {
            return Err(StorageError::BuildMismatch {
                index: expected,
                metadata: record.build_id.clone().unwrap_or_else(|| "<none>".into()),
            });
        }
        match first_model {
            None => first_model = Some(record.model_name.as_str()),
            Some(first) if first != record.model_name => {
                return Err(StorageError::MixedModels {
                    first: first.to_string(),
                    other: record.model_name.clone(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize, model: &str) -> Vec<ChunkMetadata> {
        (0..n)
            .map(|i| ChunkMetadata {
                position: i,
                chunk_id: format!("doc-{}", i),
                doc_id: "doc".into(),
                title: "Doc".into(),
                source_path: "doc.md".into(),
                text: format!("chunk {}", i),
                start: i,
                end: i + 1,
                model_name: model.into(),
                build_id: None,
            })
            .collect()
    }

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                let mut v = vec![0.0; n];
                v[i] = 1.0;
                v
            })
            .collect()
    }

    #[test]
    fn missing_directory_opens_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IndexSnapshot::open(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn written_pair_reopens_with_matching_positions() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        let index = FlatIpIndex::build(&vectors(4)).unwrap();
        let id = write_pair(&target, &index, records(4, "m")).unwrap();

        let snap = IndexSnapshot::open(&target).unwrap().unwrap();
        assert_eq!(snap.build_id(), id);
        assert_eq!(snap.index(), &index);
        assert_eq!(snap.metadata().len(), 4);
        for i in 0..4 {
            let r = snap.metadata().get(i).unwrap();
            assert_eq!(r.position, i);
            assert_eq!(r.build_id.as_deref(), Some(id.to_hex().as_str()));
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "staging dirs left: {:?}", leftovers);
    }

    #[test]
    fn rebuild_replaces_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        write_pair(&target, &FlatIpIndex::build(&vectors(3)).unwrap(), records(3, "m")).unwrap();
        let second =
            write_pair(&target, &FlatIpIndex::build(&vectors(2)).unwrap(), records(2, "m")).unwrap();

        let snap = IndexSnapshot::open(&target).unwrap().unwrap();
        assert_eq!(snap.build_id(), second);
        assert_eq!(snap.index().len(), 2);
        assert_eq!(snap.metadata().len(), 2);
    }

    #[test]
    fn row_count_mismatch_leaves_previous_pair_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        let first =
            write_pair(&target, &FlatIpIndex::build(&vectors(3)).unwrap(), records(3, "m")).unwrap();

        let err = write_pair(&target, &FlatIpIndex::build(&vectors(2)).unwrap(), records(3, "m"))
            .unwrap_err();
        assert!(matches!(err, StorageError::RowCountMismatch { .. }));
        let snap = IndexSnapshot::open(&target).unwrap().unwrap();
        assert_eq!(snap.build_id(), first);
    }

    #[test]
    fn metadata_from_another_build_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        write_pair(&a, &FlatIpIndex::build(&vectors(3)).unwrap(), records(3, "m")).unwrap();
        let mut other = records(3, "m");
        other[0].text = "different".into();
        write_pair(&b, &FlatIpIndex::build(&vectors(3)).unwrap(), other).unwrap();

        fs::copy(b.join(METADATA_FILE), a.join(METADATA_FILE)).unwrap();
        assert!(matches!(
            IndexSnapshot::open(&a),
            Err(StorageError::BuildMismatch { .. })
        ));
    }

    #[test]
    fn mixed_models_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        let mut recs = records(2, "m");
        recs[1].model_name = "other".into();
        write_pair(&target, &FlatIpIndex::build(&vectors(2)).unwrap(), recs).unwrap();
        assert!(matches!(
            IndexSnapshot::open(&target),
            Err(StorageError::MixedModels { .. })
        ));
    }

    #[test]
    fn truncated_index_opens_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        write_pair(&target, &FlatIpIndex::build(&vectors(3)).unwrap(), records(3, "m")).unwrap();

        let bytes = fs::read(target.join(INDEX_FILE)).unwrap();
        fs::write(target.join(INDEX_FILE), &bytes[..bytes.len() - 5]).unwrap();
        assert!(IndexSnapshot::open(&target).unwrap().is_none());

        fs::write(target.join(INDEX_FILE), b"").unwrap();
        assert!(IndexSnapshot::open(&target).unwrap().is_none());
    }

    #[test]
    fn readers_never_fail_while_pairs_are_swapped() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        write_pair(&target, &FlatIpIndex::build(&vectors(64)).unwrap(), records(64, "m")).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let target = target.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for round in 0..200 {
                    let mut recs = records(64, "m");
                    recs[0].text = format!("round {}", round);
                    write_pair(&target, &FlatIpIndex::build(&vectors(64)).unwrap(), recs).unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut opened = 0usize;
        while !done.load(Ordering::SeqCst) {
            if let Some(snap) = IndexSnapshot::open(&target).unwrap() {
                assert_eq!(snap.metadata().len(), 64);
                opened += 1;
            }
        }
        writer.join().unwrap();
        assert!(opened > 0);
    }

    #[test]
    fn sibling_dirs_are_unique_per_call() {
        let index = FlatIpIndex::build(&vectors(2)).unwrap();
        let id = BuildId::compute(&index, &records(2, "m"));
        let parent = Path::new("/data");
        let a = sibling_dir(parent, "index", "staging", &id);
        let b = sibling_dir(parent, "index", "staging", &id);
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!(".index.staging-{}-", id.short())));
        assert!(name.contains(&std::process::id().to_string()));
    }

    #[test]
    fn build_id_depends_on_content() {
        let index = FlatIpIndex::build(&vectors(2)).unwrap();
        let a = BuildId::compute(&index, &records(2, "m"));
        let b = BuildId::compute(&index, &records(2, "m"));
        let c = BuildId::compute(&index, &records(2, "n"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_hex().len(), 64);
    }
}
