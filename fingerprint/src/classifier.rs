use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FingerprintError;
use crate::record::FingerprintSet;
use crate::store::FingerprintStore;

/// Similarity a query must exceed to count as a known match.
///
/// Kept high on purpose: wrongly declaring a duplicate suppresses a rightful
/// Matched registration, which costs more than a missed duplicate.
pub const DEFAULT_THRESHOLD: f32 = 0.97;

/// Candidates the approximate search explores before keeping the best one.
pub const DEFAULT_NUM_CANDIDATES: usize = 150;

/// Controls classifier behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Strict lower bound on the score for `is_matched`.
    /// Default: 0.97.
    pub threshold: f32,

    /// Search breadth for the top-1 lookup.
    /// Default: 150.
    pub num_candidates: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            num_candidates: DEFAULT_NUM_CANDIDATES,
        }
    }
}

/// Outcome of a similarity query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub is_matched: bool,
    /// Best neighbor's similarity in `[0, 1]`; 0 when Matched is empty.
    pub score: f32,
}

impl ClassificationResult {
    /// Apply the decision rule `score > threshold`.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        Self {
            is_matched: score > threshold,
            score,
        }
    }
}

/// Decides whether a query vector is a near-duplicate of a Matched record.
///
/// Read-only: classification never changes stored data.
pub struct Classifier {
    store: Arc<dyn FingerprintStore>,
    cfg: ClassifierConfig,
}

impl Classifier {
    pub fn new(store: Arc<dyn FingerprintStore>, cfg: ClassifierConfig) -> Self {
        Self { store, cfg }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.cfg
    }

    /// Search Matched for the single nearest neighbor and threshold its score.
    ///
    /// Store failures, including malformed query vectors, are returned
    /// unchanged; whether to retry is up to the caller.
    pub async fn classify(&self, query: &[f32]) -> Result<ClassificationResult, FingerprintError> {
        let neighbors = self
            .store
            .nearest(FingerprintSet::Matched, query, 1, self.cfg.num_candidates)
            .await?;
        let score = neighbors.first().map_or(0.0, |n| n.score);
        let result = ClassificationResult::from_score(score, self.cfg.threshold);
        debug!(score, is_matched = result.is_matched, "classified query");
        Ok(result)
    }
}
