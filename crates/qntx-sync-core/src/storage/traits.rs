//! Storage trait definitions

use crate::attestation::Attestation;
use crate::storage::error::StoreResult;
use crate::sync::{content_hash, GroupKey, Hash};

/// Core storage operations for attestations.
///
/// Attestations are immutable: there is no update. Duplicate content is not
/// an error; committing an attestation whose content hash is already stored
/// (under any ASID) succeeds and changes nothing.
pub trait AttestationStore {
    /// Commit an attestation.
    ///
    /// Returns `true` if it was stored, `false` if semantically identical
    /// content was already present. Returns `StoreError::IdConflict` if a
    /// *different* attestation already uses the same ID.
    fn put(&mut self, attestation: Attestation) -> StoreResult<bool>;

    /// Retrieve an attestation by ID.
    ///
    /// Returns `None` if not found.
    fn get(&self, id: &str) -> StoreResult<Option<Attestation>>;

    /// Check if an attestation exists.
    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Evict an attestation by ID.
    ///
    /// Returns the evicted attestation, or `None` if it didn't exist.
    fn delete(&mut self, id: &str) -> StoreResult<Option<Attestation>>;

    /// Get all attestation IDs.
    fn ids(&self) -> StoreResult<Vec<String>>;

    /// Get the total count of attestations.
    fn count(&self) -> StoreResult<usize> {
        Ok(self.ids()?.len())
    }

    /// Enumerate every stored attestation.
    fn all(&self) -> StoreResult<Vec<Attestation>>;

    /// All attestations indexed under one (actor, context) group.
    fn by_group(&self, key: &GroupKey) -> StoreResult<Vec<Attestation>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|a| a.in_group(key))
            .collect())
    }

    /// Check whether content with this hash is stored under any ID.
    fn contains_content(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.all()?.iter().any(|a| content_hash(a) == *hash))
    }
}

/// Notification sink for store writes.
///
/// Called synchronously from the store's write path, so implementations
/// must return quickly and never call back into the store.
pub trait AttestationObserver: Send + Sync {
    /// A new attestation was committed.
    fn on_create(&self, attestation: &Attestation);

    /// An attestation was evicted.
    fn on_evict(&self, attestation: &Attestation) {
        let _ = attestation;
    }
}
