//! Exact nearest-neighbor index over inner product.
//!
//! [`FlatIndex`] stores every vector contiguously and scores a query
//! against all of them. Callers normalize vectors before adding and before
//! querying, which turns inner product into cosine similarity.
//!
//! # Binary layout
//!
//! ```text
//! ┌──────────┬─────────┬──────┬───────┬──────────────────────────┐
//! │ FOLIOIDX │ version │ dims │ count │ count × dims f32 (LE)    │
//! │ 8 bytes  │ u32 LE  │ u32  │ u64   │                          │
//! └──────────┴─────────┴──────┴───────┴──────────────────────────┘
//! ```

use anyhow::{bail, Result};
use std::cmp::Ordering;

use crate::embedding::{blob_to_vec, dot, vec_to_blob};

const MAGIC: &[u8; 8] = b"FOLIOIDX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8;

/// A flat (brute-force) inner-product index of fixed dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dims` components.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors. Either every vector is added or none is.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if self.dims == 0 && !vectors.is_empty() {
            bail!("cannot add vectors to a zero-dimensional index");
        }
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != self.dims) {
            bail!(
                "vector {} has {} dimensions, index expects {}",
                i,
                v.len(),
                self.dims
            );
        }
        self.data.reserve(vectors.len() * self.dims);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// Top-`k` positions by descending inner product with `query`.
    ///
    /// Ties keep insertion order. `k` larger than the index returns every
    /// position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dims {
            bail!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dims
            );
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(i, v)| (i, dot(query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Serialize to the binary layout described in the module docs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&vec_to_blob(&self.data));
        bytes
    }

    /// Parse the binary layout produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
            bail!("not a folio index file");
        }
        let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if version != FORMAT_VERSION {
            bail!("unsupported index format version {}", version);
        }
        let dims = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[16..24]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| anyhow::anyhow!("index header overflows"))?;
        if body.len() != expected {
            bail!(
                "index body is {} bytes, header promises {} ({} × {} dims)",
                body.len(),
                expected,
                count,
                dims
            );
        }

        Ok(Self {
            dims,
            data: blob_to_vec(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(vectors: &[Vec<f32>]) -> FlatIndex {
        let mut index = FlatIndex::new(vectors[0].len());
        index.add(vectors).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = index_with(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]]);
        let hits = index.search(&[0.0, 1.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_caps_at_len_and_k() {
        let index = index_with(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 0.0], 1).unwrap().len(), 1);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = index_with(&[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]]);
        let order: Vec<usize> = index
            .search(&[1.0, 0.0], 3)
            .unwrap()
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_add_rejects_wrong_dims_without_partial_append() {
        let mut index = FlatIndex::new(2);
        let err = index.add(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        assert!(err.is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_query_dims_mismatch_is_error() {
        let index = FlatIndex::new(3);
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let index = index_with(&[vec![0.5, -0.25, 1.0], vec![0.0, 0.0, 1.0]]);
        let restored = FlatIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored, index);
        assert_eq!(restored.search(&[-1.0, 0.0, 1.0], 1).unwrap(), vec![(1, 1.0)]);
    }

    #[test]
    fn test_empty_index_roundtrip_keeps_dims() {
        let restored = FlatIndex::from_bytes(&FlatIndex::new(768).to_bytes()).unwrap();
        assert_eq!(restored.dims(), 768);
        assert!(restored.is_empty());
    }

    #[test]
    fn test_from_bytes_rejects_truncated_body() {
        let mut bytes = index_with(&[vec![1.0, 2.0]]).to_bytes();
        bytes.pop();
        assert!(FlatIndex::from_bytes(&bytes).is_err());
        assert!(FlatIndex::from_bytes(b"garbage").is_err());
    }
}
