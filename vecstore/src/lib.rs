//! Approximate and exact nearest-neighbor indexes over dense `f32` vectors.
//!
//! Both indexes rank by cosine distance and key vectors by a caller-chosen
//! `u64` id. [`HNSW`] trades exactness for sub-linear search; [`FlatIndex`]
//! scans everything and is the reference for tests and small sets.

pub mod cosine;
pub mod error;
pub mod flat;
pub mod hnsw;
pub mod vecstore;

pub use cosine::{cosine_distance, similarity_score};
pub use error::VecError;
pub use flat::FlatIndex;
pub use hnsw::{HNSW, HNSWConfig};
pub use vecstore::{Match, VecIndex};
