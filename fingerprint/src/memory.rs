//! In-process [`FingerprintStore`] backed by a vector index per set.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use facematch_vecstore::{FlatIndex, HNSW, HNSWConfig, VecError, VecIndex};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::FingerprintError;
use crate::record::{ExactKey, FingerprintRecord, FingerprintSet, validate_vector};
use crate::store::{FingerprintStore, Neighbor, Page, PageRequest};

/// Which vector index backs each set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Approximate HNSW graph.
    #[default]
    Hnsw,
    /// Exact brute-force scan.
    Flat,
}

/// Configures a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Embedding dimension shared by both sets.
    pub dim: usize,
    pub index: IndexKind,
    /// HNSW max links per layer. Ignored by the flat index.
    pub m: usize,
    /// HNSW build-time candidate list size. Ignored by the flat index.
    pub ef_construction: usize,
}

impl MemoryStoreConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            index: IndexKind::Hnsw,
            m: 16,
            ef_construction: 200,
        }
    }

    pub fn index(mut self, index: IndexKind) -> Self {
        self.index = index;
        self
    }

    fn build_index(&self) -> Result<Box<dyn VecIndex>, VecError> {
        Ok(match self.index {
            IndexKind::Hnsw => Box::new(HNSW::new(HNSWConfig {
                dim: self.dim,
                m: self.m,
                ef_construction: self.ef_construction,
            })?),
            IndexKind::Flat => Box::new(FlatIndex::new(self.dim)?),
        })
    }
}

/// One logical set: records keyed by insertion sequence, an exact-match
/// lookup table and the vector index.
struct Collection {
    records: BTreeMap<u64, FingerprintRecord>,
    by_key: HashMap<ExactKey, Vec<u64>>,
    index: Box<dyn VecIndex>,
}

impl Collection {
    fn new(index: Box<dyn VecIndex>) -> Self {
        Self {
            records: BTreeMap::new(),
            by_key: HashMap::new(),
            index,
        }
    }

    fn insert(&mut self, id: u64, record: FingerprintRecord) -> Result<(), FingerprintError> {
        self.index
            .insert(id, &record.embedding)
            .map_err(index_error)?;
        self.by_key.entry(record.key()).or_default().push(id);
        self.records.insert(id, record);
        Ok(())
    }

    fn remove(&mut self, id: u64) {
        self.index.delete(id);
        self.records.remove(&id);
    }
}

/// MemoryStore is a volatile [`FingerprintStore`]. Data is lost on restart.
///
/// Like a document store without a unique index, it accepts identical
/// records; exact lookups return the oldest copy.
pub struct MemoryStore {
    unmatched: RwLock<Collection>,
    matched: RwLock<Collection>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new(cfg: MemoryStoreConfig) -> Result<Self, FingerprintError> {
        Ok(Self {
            unmatched: RwLock::new(Collection::new(cfg.build_index()?)),
            matched: RwLock::new(Collection::new(cfg.build_index()?)),
            seq: AtomicU64::new(0),
        })
    }

    fn collection(&self, set: FingerprintSet) -> &RwLock<Collection> {
        match set {
            FingerprintSet::Unmatched => &self.unmatched,
            FingerprintSet::Matched => &self.matched,
        }
    }
}

/// Dimension and emptiness problems are the caller's input, not the index's.
fn index_error(e: VecError) -> FingerprintError {
    match e {
        VecError::DimensionMismatch { .. } | VecError::EmptyVector => {
            FingerprintError::Validation(e.to_string())
        }
        other => FingerprintError::Index(other),
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn insert(
        &self,
        set: FingerprintSet,
        record: FingerprintRecord,
    ) -> Result<(), FingerprintError> {
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.collection(set).write().insert(id, record)
    }

    async fn find_exact(
        &self,
        set: FingerprintSet,
        record: &FingerprintRecord,
    ) -> Result<Option<FingerprintRecord>, FingerprintError> {
        let coll = self.collection(set).read();
        Ok(coll
            .by_key
            .get(&record.key())
            .and_then(|ids| ids.first())
            .and_then(|id| coll.records.get(id))
            .cloned())
    }

    async fn delete_one(
        &self,
        set: FingerprintSet,
        record: &FingerprintRecord,
    ) -> Result<bool, FingerprintError> {
        let key = record.key();
        let mut coll = self.collection(set).write();
        let Some(ids) = coll.by_key.get_mut(&key) else {
            return Ok(false);
        };
        let id = ids.remove(0);
        if ids.is_empty() {
            coll.by_key.remove(&key);
        }
        coll.remove(id);
        Ok(true)
    }

    async fn delete_all(
        &self,
        set: FingerprintSet,
        record: &FingerprintRecord,
    ) -> Result<usize, FingerprintError> {
        let mut coll = self.collection(set).write();
        let Some(ids) = coll.by_key.remove(&record.key()) else {
            return Ok(0);
        };
        for &id in &ids {
            coll.remove(id);
        }
        Ok(ids.len())
    }

    async fn nearest(
        &self,
        set: FingerprintSet,
        query: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<Neighbor>, FingerprintError> {
        validate_vector(query)?;
        let coll = self.collection(set).read();
        let matches = coll
            .index
            .search(query, k, num_candidates)
            .map_err(index_error)?;
        Ok(matches
            .into_iter()
            .filter_map(|m| {
                coll.records.get(&m.id).map(|record| Neighbor {
                    record: record.clone(),
                    score: m.score(),
                })
            })
            .collect())
    }

    async fn list(
        &self,
        set: FingerprintSet,
        req: PageRequest,
    ) -> Result<Page<FingerprintRecord>, FingerprintError> {
        let coll = self.collection(set).read();
        let data = coll
            .records
            .values()
            .rev()
            .skip(req.offset())
            .take(req.limit)
            .cloned()
            .collect();
        Ok(Page::new(data, req, coll.records.len()))
    }

    async fn count(&self, set: FingerprintSet) -> Result<usize, FingerprintError> {
        Ok(self.collection(set).read().records.len())
    }
}
