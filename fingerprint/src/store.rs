use async_trait::async_trait;
use serde::Serialize;

use crate::error::FingerprintError;
use crate::record::{FingerprintRecord, FingerprintSet};

/// A stored record returned by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub record: FingerprintRecord,
    /// Similarity in `[0, 1]`, higher is more similar.
    pub score: f32,
}

/// One-based page selector for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Page numbers below 1 select the first page; a zero limit becomes 1.
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// A page of records plus totals for the whole set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_entries: usize,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, req: PageRequest, total_entries: usize) -> Self {
        Self {
            data,
            current_page: req.page,
            total_pages: total_entries.div_ceil(req.limit),
            total_entries,
        }
    }
}

/// FingerprintStore holds the Unmatched and Matched sets.
///
/// Exact-match operations compare both `file` and every embedding
/// component. Similarity search is only used by [`crate::Classifier`].
/// Implementations need not enforce uniqueness: a set may hold several
/// identical records.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Append a record to `set`.
    async fn insert(
        &self,
        set: FingerprintSet,
        record: FingerprintRecord,
    ) -> Result<(), FingerprintError>;

    /// Return one record exactly equal to `record`, if any.
    async fn find_exact(
        &self,
        set: FingerprintSet,
        record: &FingerprintRecord,
    ) -> Result<Option<FingerprintRecord>, FingerprintError>;

    /// Delete one record exactly equal to `record`. Returns whether one existed.
    async fn delete_one(
        &self,
        set: FingerprintSet,
        record: &FingerprintRecord,
    ) -> Result<bool, FingerprintError>;

    /// Delete every record exactly equal to `record`. Returns how many.
    async fn delete_all(
        &self,
        set: FingerprintSet,
        record: &FingerprintRecord,
    ) -> Result<usize, FingerprintError>;

    /// Return up to `k` records nearest to `query`, best score first.
    /// `num_candidates` bounds the approximate search before truncation.
    async fn nearest(
        &self,
        set: FingerprintSet,
        query: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Neighbor>, FingerprintError>;

    /// List records newest first.
    async fn list(
        &self,
        set: FingerprintSet,
        req: PageRequest,
    ) -> Result<Page<FingerprintRecord>, FingerprintError>;

    async fn count(&self, set: FingerprintSet) -> Result<usize, FingerprintError>;
}
