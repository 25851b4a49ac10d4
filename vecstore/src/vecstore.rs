use crate::cosine::similarity_score;
use crate::error::VecError;

/// Match is a single result from a vector similarity search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Identifier of the matched vector.
    pub id: u64,

    /// Cosine distance between the query and matched vector.
    /// Lower values indicate higher similarity.
    pub distance: f32,
}

impl Match {
    /// Similarity score in `[0, 1]`, higher is more similar.
    pub fn score(&self) -> f32 {
        similarity_score(self.distance)
    }
}

/// VecIndex is the interface for nearest-neighbor search over dense float32
/// vectors of a fixed dimension.
///
/// All implementations must be safe for concurrent use (Send + Sync).
pub trait VecIndex: Send + Sync {
    /// Dimension every inserted and queried vector must have.
    fn dim(&self) -> usize;

    /// Add or replace the vector stored under `id`.
    fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VecError>;

    /// Return up to `top_k` nearest vectors to the query, ordered by
    /// ascending distance (closest first).
    ///
    /// `num_candidates` bounds how many candidates an approximate index
    /// explores before truncating to `top_k`. Exact indexes ignore it.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Match>, VecError>;

    /// Remove a vector by ID. No error if ID does not exist.
    fn delete(&self, id: u64);

    /// Return the number of vectors in the index.
    fn len(&self) -> usize;

    /// Return true if the index contains no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reject vectors an index of dimension `dim` cannot hold or search with.
pub(crate) fn check_dim(vector: &[f32], dim: usize) -> Result<(), VecError> {
    if vector.is_empty() {
        return Err(VecError::EmptyVector);
    }
    if vector.len() != dim {
        return Err(VecError::DimensionMismatch {
            got: vector.len(),
            want: dim,
        });
    }
    Ok(())
}
