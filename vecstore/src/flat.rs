use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cosine::cosine_distance;
use crate::error::VecError;
use crate::vecstore::{Match, VecIndex, check_dim};

/// FlatIndex is an exact VecIndex using brute-force cosine distance.
/// Intended for testing and small sets (< 1000 vectors).
pub struct FlatIndex {
    dim: usize,
    vectors: RwLock<HashMap<u64, Vec<f32>>>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Result<Self, VecError> {
        if dim == 0 {
            return Err(VecError::ZeroDimension);
        }
        Ok(Self {
            dim,
            vectors: RwLock::new(HashMap::new()),
        })
    }
}

impl VecIndex for FlatIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VecError> {
        check_dim(vector, self.dim)?;
        self.vectors.write().insert(id, vector.to_vec());
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        _num_candidates: usize,
    ) -> Result<Vec<Match>, VecError> {
        check_dim(query, self.dim)?;
        let vecs = self.vectors.read();
        if vecs.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<Match> = vecs
            .iter()
            .map(|(&id, vec)| Match {
                id,
                distance: cosine_distance(query, vec),
            })
            .collect();

        // Ties resolve to the lower id so results are deterministic.
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        results.truncate(top_k);
        Ok(results)
    }

    fn delete(&self, id: u64) {
        self.vectors.write().remove(&id);
    }

    fn len(&self) -> usize {
        self.vectors.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_search() {
        let idx = FlatIndex::new(4).unwrap();
        idx.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        idx.insert(3, &[0.9, 0.1, 0.0, 0.0]).unwrap();

        let matches = idx.search(&[1.0, 0.0, 0.0, 0.0], 2, 150).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, 1);
        assert_eq!(matches[1].id, 3);
        assert!(matches[0].score() > matches[1].score());
    }

    #[test]
    fn test_replace_existing() {
        let idx = FlatIndex::new(2).unwrap();
        idx.insert(7, &[1.0, 0.0]).unwrap();
        idx.insert(7, &[0.0, 1.0]).unwrap();
        assert_eq!(idx.len(), 1);

        let matches = idx.search(&[0.0, 1.0], 1, 1).unwrap();
        assert_eq!(matches[0].id, 7);
        assert!(matches[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_delete() {
        let idx = FlatIndex::new(2).unwrap();
        idx.insert(1, &[1.0, 0.0]).unwrap();
        assert_eq!(idx.len(), 1);
        idx.delete(1);
        assert!(idx.is_empty());
        idx.delete(42);
    }

    #[test]
    fn test_search_empty() {
        let idx = FlatIndex::new(3).unwrap();
        let matches = idx.search(&[1.0, 0.0, 0.0], 5, 150).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_rejects_bad_vectors() {
        let idx = FlatIndex::new(3).unwrap();
        assert_eq!(idx.insert(1, &[]), Err(VecError::EmptyVector));
        assert_eq!(
            idx.search(&[1.0, 0.0], 1, 1),
            Err(VecError::DimensionMismatch { got: 2, want: 3 })
        );
        assert!(FlatIndex::new(0).is_err());
    }
}
