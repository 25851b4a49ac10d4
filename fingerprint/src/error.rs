use facematch_vecstore::VecError;
use thiserror::Error;

/// Errors returned by fingerprint store, classifier and state machine calls.
///
/// An `AlreadyExists` condition is not an error; see [`crate::Outcome`].
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// Malformed input: missing file, empty or non-finite embedding,
    /// wrong dimension. Retrying the same input will fail again.
    #[error("fingerprint: invalid input: {0}")]
    Validation(String),

    /// The backing store could not serve the request. Transient.
    #[error("fingerprint: store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("fingerprint: not found")]
    NotFound,

    #[error("fingerprint: index error: {0}")]
    Index(#[from] VecError),
}

impl FingerprintError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FingerprintError::StoreUnavailable(_))
    }
}
