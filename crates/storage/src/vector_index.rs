//! Exact inner-product index over unit-length vectors.
//!
//! On-disk layout (little-endian):
//!
//! ```text
//! magic "KBVI" | version u32 | dimension u32 | rows u64 | build id [u8; 32] | rows * dimension f32
//! ```

use crate::artifacts::BuildId;
use crate::{Result, StorageError};
use std::cmp::Ordering;
use std::io::Write;

const MAGIC: &[u8; 4] = b"KBVI";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32;

/// One search result: similarity and the row it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub score: f32,
    pub row: usize,
}

/// Flat (brute-force) index. Rows are stored contiguously in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

// Never empty: `build` and `from_bytes` both reject zero rows.
#[allow(clippy::len_without_is_empty)]
impl FlatIpIndex {
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let first = vectors.first().ok_or(StorageError::EmptyIndex)?;
        let dimension = first.len();
        if dimension == 0 {
            return Err(StorageError::ZeroDimension);
        }
        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != dimension {
                return Err(StorageError::InconsistentRow {
                    row,
                    expected: dimension,
                    actual: v.len(),
                });
            }
            data.extend_from_slice(v);
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Returns the `min(k, len)` best rows by inner product, highest first.
    /// Equal scores are ordered by ascending row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Hit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, v)| Hit {
                score: dot(v, query),
                row,
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_by(rank);
        Ok(hits)
    }

    pub fn write_to<W: Write>(&self, w: &mut W, build_id: &BuildId) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        let dimension = u32::try_from(self.dimension)
            .map_err(|_| StorageError::CorruptIndex("dimension exceeds u32".into()))?;
        w.write_all(&dimension.to_le_bytes())?;
        w.write_all(&(self.len() as u64).to_le_bytes())?;
        w.write_all(build_id.as_bytes())?;
        for value in &self.data {
            w.write_all(&value.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, BuildId)> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::CorruptIndex(format!(
                "file is {} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let mut cursor = Cursor::new(bytes);
        if cursor.take(4)? != MAGIC {
            return Err(StorageError::CorruptIndex("bad magic".into()));
        }
        let version = cursor.u32()?;
        if version != FORMAT_VERSION {
            return Err(StorageError::CorruptIndex(format!(
                "unsupported format version {}",
                version
            )));
        }
        let dimension = cursor.u32()? as usize;
        let rows = usize::try_from(cursor.u64()?)
            .map_err(|_| StorageError::CorruptIndex("row count overflows usize".into()))?;
        let mut id = [0u8; 32];
        id.copy_from_slice(cursor.take(32)?);
        let build_id = BuildId::from_bytes(id);

        if dimension == 0 || rows == 0 {
            return Err(StorageError::CorruptIndex(format!(
                "empty index ({} rows x {} dims)",
                rows, dimension
            )));
        }
        let expected = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| StorageError::CorruptIndex("payload size overflows".into()))?;
        let payload = cursor.rest();
        if payload.len() != expected {
            return Err(StorageError::CorruptIndex(format!(
                "payload is {} bytes, expected {}",
                payload.len(),
                expected
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok((Self { dimension, data }, build_id))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn rank(a: &Hit, b: &Hit) -> Ordering {
    b.score.total_cmp(&a.score).then(a.row.cmp(&b.row))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| StorageError::CorruptIndex("unexpected end of file".into()))?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(word))
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f32]) -> Vec<f32> {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        values.iter().map(|v| v / norm).collect()
    }

    fn sample() -> Vec<Vec<f32>> {
        vec![
            unit(&[1.0, 0.0, 0.0]),
            unit(&[0.0, 1.0, 0.0]),
            unit(&[1.0, 1.0, 0.0]),
            unit(&[0.0, 0.0, 1.0]),
            unit(&[1.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn build_rejects_empty_and_ragged_input() {
        assert!(matches!(
            FlatIpIndex::build(&[]),
            Err(StorageError::EmptyIndex)
        ));
        assert!(matches!(
            FlatIpIndex::build(&[vec![]]),
            Err(StorageError::ZeroDimension)
        ));
        let ragged = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(matches!(
            FlatIpIndex::build(&ragged),
            Err(StorageError::InconsistentRow { row: 1, .. })
        ));
    }

    #[test]
    fn indexed_vector_is_its_own_top_hit() {
        let vectors = sample();
        let index = FlatIpIndex::build(&vectors).unwrap();
        for (row, v) in vectors.iter().enumerate() {
            let hits = index.search(v, 1).unwrap();
            assert_eq!(hits[0].row, row);
            assert!((hits[0].score - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn results_are_descending_with_row_tie_break() {
        let vectors = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
        ];
        let index = FlatIpIndex::build(&vectors).unwrap();
        let hits = index.search(&[1.0, 0.0], 4).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![1, 3, 0, 2]);

        let partial = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(partial.iter().map(|h| h.row).collect::<Vec<_>>(), vec![1, 3, 0]);
    }

    #[test]
    fn k_is_clipped_to_row_count() {
        let index = FlatIpIndex::build(&sample()).unwrap();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 50).unwrap().len(), 5);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(StorageError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn bytes_round_trip_preserves_search_results() {
        let index = FlatIpIndex::build(&sample()).unwrap();
        let build_id = BuildId::from_bytes([7u8; 32]);
        let mut buf = Vec::new();
        index.write_to(&mut buf, &build_id).unwrap();

        let (reloaded, id) = FlatIpIndex::from_bytes(&buf).unwrap();
        assert_eq!(id, build_id);
        assert_eq!(reloaded, index);

        let query = unit(&[0.3, 0.9, 0.1]);
        assert_eq!(
            index.search(&query, 5).unwrap(),
            reloaded.search(&query, 5).unwrap()
        );
    }

    #[test]
    fn truncated_or_padded_files_are_rejected() {
        let index = FlatIpIndex::build(&sample()).unwrap();
        let mut buf = Vec::new();
        index.write_to(&mut buf, &BuildId::from_bytes([1u8; 32])).unwrap();

        assert!(matches!(
            FlatIpIndex::from_bytes(&buf[..buf.len() - 1]),
            Err(StorageError::CorruptIndex(_))
        ));
        let mut padded = buf.clone();
        padded.push(0);
        assert!(matches!(
            FlatIpIndex::from_bytes(&padded),
            Err(StorageError::CorruptIndex(_))
        ));
        let mut bad_magic = buf;
        bad_magic[0] = b'X';
        assert!(matches!(
            FlatIpIndex::from_bytes(&bad_magic),
            Err(StorageError::CorruptIndex(_))
        ));
    }
}
