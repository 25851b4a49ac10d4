//! Transitions of a record between the Unmatched and Matched sets.
//!
//! ```text
//! NotPresent -> Unmatched -> Matched -> Deleted
//!                   |
//!                   +-------------------> Deleted
//! ```
//!
//! There is no transition from Matched back to Unmatched. Every duplicate
//! check here is exact equality on `(file, embedding)`; similarity plays no
//! part in writes.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::FingerprintError;
use crate::record::{FingerprintRecord, FingerprintSet};
use crate::store::FingerprintStore;

/// Result of an insert-style transition. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    /// The exact pair was already in the target set; nothing changed.
    AlreadyExists,
}

impl Outcome {
    pub fn is_created(self) -> bool {
        self == Outcome::Created
    }
}

/// Applies deduplicated set transitions against a [`FingerprintStore`].
///
/// Holds no state of its own; concurrent calls are independent requests.
pub struct StateMachine {
    store: Arc<dyn FingerprintStore>,
}

impl StateMachine {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// NotPresent -> Unmatched. A no-op if the exact pair is already there.
    pub async fn register_unmatched(
        &self,
        file: &str,
        embedding: &[f32],
    ) -> Result<Outcome, FingerprintError> {
        let record = FingerprintRecord::new(file, embedding);
        record.validate()?;

        if self
            .store
            .find_exact(FingerprintSet::Unmatched, &record)
            .await?
            .is_some()
        {
            debug!(file, "unmatched entry already exists");
            return Ok(Outcome::AlreadyExists);
        }

        self.store.insert(FingerprintSet::Unmatched, record).await?;
        info!(file, "registered unmatched fingerprint");
        Ok(Outcome::Created)
    }

    /// Unmatched -> Matched, or NotPresent -> Matched.
    ///
    /// Removes one exact copy from Unmatched if present, then inserts into
    /// Matched. The two steps are not atomic; calling again after a failure
    /// converges to the same end state because both steps tolerate the
    /// other having already happened.
    pub async fn promote_to_matched(
        &self,
        file: &str,
        embedding: &[f32],
    ) -> Result<Outcome, FingerprintError> {
        let record = FingerprintRecord::new(file, embedding);
        record.validate()?;

        if self
            .store
            .find_exact(FingerprintSet::Matched, &record)
            .await?
            .is_some()
        {
            debug!(file, "matched entry already exists");
            return Ok(Outcome::AlreadyExists);
        }

        let was_unmatched = self
            .store
            .delete_one(FingerprintSet::Unmatched, &record)
            .await?;
        self.store.insert(FingerprintSet::Matched, record).await?;
        info!(file, was_unmatched, "promoted fingerprint to matched");
        Ok(Outcome::Created)
    }

    /// Unmatched -> Deleted. Absence counts as success.
    pub async fn remove_unmatched(
        &self,
        file: &str,
        embedding: &[f32],
    ) -> Result<(), FingerprintError> {
        let record = FingerprintRecord::new(file, embedding);
        record.validate()?;

        let removed = self
            .store
            .delete_one(FingerprintSet::Unmatched, &record)
            .await?;
        debug!(file, removed, "removed unmatched fingerprint");
        Ok(())
    }

    /// Matched -> Deleted, for every exact copy. Returns how many were removed;
    /// zero is success.
    ///
    /// Matched can hold copies when two promotions of the same pair race,
    /// so this is also the cleanup for that case.
    pub async fn remove_matched(
        &self,
        file: &str,
        embedding: &[f32],
    ) -> Result<usize, FingerprintError> {
        let record = FingerprintRecord::new(file, embedding);
        record.validate()?;

        let deleted = self
            .store
            .delete_all(FingerprintSet::Matched, &record)
            .await?;
        info!(file, deleted, "removed matched fingerprints");
        Ok(deleted)
    }
}
