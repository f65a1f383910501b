//! Store error types

use thiserror::Error;

/// Failures reported by an [`AttestationStore`](super::AttestationStore).
///
/// Committing content that is already stored is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The ID is taken by an attestation with different content
    #[error("ID {0} already holds different content")]
    IdConflict(String),

    /// The attestation cannot be stored as given
    #[error("invalid attestation: {0}")]
    InvalidData(String),

    /// The backend itself failed (database, filesystem, ...)
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
