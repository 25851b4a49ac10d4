use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;

/// The two disjoint sets a fingerprint record can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintSet {
    /// Provisional, not yet confirmed.
    Unmatched,
    /// Confirmed identities; the set similarity queries run against.
    Matched,
}

impl fmt::Display for FingerprintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintSet::Unmatched => f.write_str("unmatched"),
            FingerprintSet::Matched => f.write_str("matched"),
        }
    }
}

/// A source item identifier paired with its feature vector.
///
/// Serialized as `{"file": ..., "embeddings": [...]}`; `embedding` is
/// accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub file: String,
    #[serde(rename = "embeddings", alias = "embedding")]
    pub embedding: Vec<f32>,
}

impl FingerprintRecord {
    pub fn new(file: impl Into<String>, embedding: impl Into<Vec<f32>>) -> Self {
        Self {
            file: file.into(),
            embedding: embedding.into(),
        }
    }

    /// Check the fields every write path requires.
    pub fn validate(&self) -> Result<(), FingerprintError> {
        if self.file.is_empty() {
            return Err(FingerprintError::Validation("file is required".into()));
        }
        validate_vector(&self.embedding)
    }

    /// Identity used by exact-match lookups.
    pub(crate) fn key(&self) -> ExactKey {
        ExactKey {
            file: self.file.clone(),
            bits: self
                .embedding
                .iter()
                .map(|&x| if x == 0.0 { 0 } else { x.to_bits() })
                .collect(),
        }
    }
}

/// Reject vectors no index could store or compare meaningfully.
pub(crate) fn validate_vector(vector: &[f32]) -> Result<(), FingerprintError> {
    if vector.is_empty() {
        return Err(FingerprintError::Validation("embedding is required".into()));
    }
    if let Some(i) = vector.iter().position(|x| !x.is_finite()) {
        return Err(FingerprintError::Validation(format!(
            "embedding[{i}] is not a finite number"
        )));
    }
    Ok(())
}

/// Exact `(file, embedding)` identity. Components compare by bit pattern,
/// with `-0.0` folded into `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ExactKey {
    file: String,
    bits: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let rec = FingerprintRecord::new("a.jpg", vec![0.5, 1.0]);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json, serde_json::json!({"file": "a.jpg", "embeddings": [0.5, 1.0]}));

        let parsed: FingerprintRecord =
            serde_json::from_str(r#"{"file":"a.jpg","embedding":[0.5,1.0]}"#).unwrap();
        assert_eq!(parsed, rec);
    }

    #[test]
    fn test_validate() {
        assert!(FingerprintRecord::new("a", vec![1.0]).validate().is_ok());
        assert!(matches!(
            FingerprintRecord::new("", vec![1.0]).validate(),
            Err(FingerprintError::Validation(_))
        ));
        assert!(matches!(
            FingerprintRecord::new("a", Vec::new()).validate(),
            Err(FingerprintError::Validation(_))
        ));
        assert!(matches!(
            FingerprintRecord::new("a", vec![1.0, f32::NAN]).validate(),
            Err(FingerprintError::Validation(_))
        ));
    }

    #[test]
    fn test_exact_key() {
        let a = FingerprintRecord::new("a", vec![0.0, 1.0]);
        let b = FingerprintRecord::new("a", vec![-0.0, 1.0]);
        let c = FingerprintRecord::new("a", vec![0.0, 1.000_001]);
        let d = FingerprintRecord::new("b", vec![0.0, 1.0]);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_ne!(a.key(), d.key());
    }
}
