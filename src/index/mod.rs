
use tracing::debug;

use crate::{QaError, Result};

/// A nearest neighbor returned by a search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the matched vector; positions follow insertion order, so
    /// position `i` is chunk `i` of the corpus the index was built from
    pub index: usize,
    /// Euclidean distance to the query vector
    pub distance: f32,
}

/// Flat in-memory vector store with exact nearest-neighbor search by
/// Euclidean (L2) distance.
///
/// Vectors are stored row-major in insertion order. The dimension is fixed
/// at build time and every query must match it. An index always holds at
/// least one vector; building from an empty set is an error so that callers
/// must represent "nothing indexed" as a distinct state.
pub struct VectorIndex {
    dimension: usize,
    values: Vec<f32>,
    len: usize,
}

impl VectorIndex {
    /// Build an index over all corpus vectors
    #[inline]
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let Some(first) = vectors.first() else {
            return Err(QaError::Index(
                "Cannot build an index from zero vectors".to_string(),
            ));
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(QaError::Index(
                "Cannot build an index from zero-dimension vectors".to_string(),
            ));
        }

        let mut values = Vec::with_capacity(vectors.len() * dimension);
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(QaError::Index(format!(
                    "Vector {} has dimension {} but the index has dimension {}",
                    i,
                    vector.len(),
                    dimension
                )));
            }
            values.extend_from_slice(vector);
        }

        debug!(
            "Built flat index over {} vectors of dimension {}",
            vectors.len(),
            dimension
        );

        Ok(Self {
            dimension,
            values,
            len: vectors.len(),
        })
    }

    /// Number of stored vectors
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Dimension every stored and query vector must have
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Find the `k` nearest stored vectors to `query`, ordered by ascending
    /// Euclidean distance. Requesting more neighbors than the index holds
    /// returns everything it holds.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(QaError::Index(format!(
                "Query has dimension {} but the index has dimension {}",
                query.len(),
                self.dimension
            )));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .values
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(index, row)| Neighbor {
                index,
                distance: l2_distance(query, row),
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k.min(self.len));

        Ok(neighbors)
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}
