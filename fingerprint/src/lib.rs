//! Near-duplicate classification of feature-vector fingerprints and the
//! Matched/Unmatched set transitions built on top of it.
//!
//! Two notions of "duplicate" live here and are kept apart:
//!
//! - [`Classifier`] answers "is this close to something confirmed?" with an
//!   approximate top-1 search over Matched and a fixed score threshold.
//! - [`StateMachine`] dedups writes by exact `(file, embedding)` equality.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use facematch_fingerprint::{
//!     Classifier, ClassifierConfig, FingerprintError, MemoryStore, MemoryStoreConfig,
//!     StateMachine,
//! };
//!
//! # async fn run() -> Result<(), FingerprintError> {
//! let store = Arc::new(MemoryStore::new(MemoryStoreConfig::new(3))?);
//! let machine = StateMachine::new(store.clone());
//! let classifier = Classifier::new(store, ClassifierConfig::default());
//!
//! machine.promote_to_matched("frame_0001.jpg", &[0.1, 0.2, 0.3]).await?;
//! let result = classifier.classify(&[0.1, 0.2, 0.3]).await?;
//! assert!(result.is_matched);
//! # Ok(())
//! # }
//! ```

mod chart;
mod classifier;
mod error;
mod memory;
mod record;
mod state;
mod store;

pub use chart::{ChartLog, ChartPoint, MemoryChartLog};
pub use classifier::{
    ClassificationResult, Classifier, ClassifierConfig, DEFAULT_NUM_CANDIDATES,
    DEFAULT_THRESHOLD,
};
pub use error::FingerprintError;
pub use memory::{IndexKind, MemoryStore, MemoryStoreConfig};
pub use record::{FingerprintRecord, FingerprintSet};
pub use state::{Outcome, StateMachine};
pub use store::{FingerprintStore, Neighbor, Page, PageRequest};
