//! In-memory storage backend
//!
//! A simple HashMap-based implementation for testing and development.
//! Not suitable for production use due to lack of persistence.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::attestation::Attestation;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::traits::{AttestationObserver, AttestationStore};
use crate::sync::{content_hash, GroupKey, Hash};

/// In-memory attestation store.
///
/// Stores attestations in a HashMap, with a content-hash index so duplicate
/// claims arriving under a different ASID are recognised. Useful for:
/// - Unit testing
/// - Development/prototyping
/// - Short-lived processes that don't need persistence
#[derive(Default)]
pub struct MemoryStore {
    attestations: HashMap<String, Attestation>,
    // content hash → ASID
    by_content: HashMap<Hash, String>,
    observers: Vec<Arc<dyn AttestationObserver>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for create/evict notifications.
    ///
    /// Observers only see writes made after they subscribe.
    pub fn subscribe(&mut self, observer: Arc<dyn AttestationObserver>) {
        self.observers.push(observer);
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("attestations", &self.attestations.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl AttestationStore for MemoryStore {
    fn put(&mut self, attestation: Attestation) -> StoreResult<bool> {
        if attestation.id.is_empty() {
            return Err(StoreError::InvalidData("attestation has no ID".into()));
        }

        let hash = content_hash(&attestation);
        if self.by_content.contains_key(&hash) {
            return Ok(false);
        }
        if self.attestations.contains_key(&attestation.id) {
            return Err(StoreError::IdConflict(attestation.id));
        }

        let id = attestation.id.clone();
        self.by_content.insert(hash, id.clone());
        self.attestations.insert(id.clone(), attestation);

        if let Some(stored) = self.attestations.get(&id) {
            for observer in &self.observers {
                observer.on_create(stored);
            }
        }
        Ok(true)
    }

    fn get(&self, id: &str) -> StoreResult<Option<Attestation>> {
        Ok(self.attestations.get(id).cloned())
    }

    fn delete(&mut self, id: &str) -> StoreResult<Option<Attestation>> {
        let Some(removed) = self.attestations.remove(id) else {
            return Ok(None);
        };
        self.by_content.remove(&content_hash(&removed));
        for observer in &self.observers {
            observer.on_evict(&removed);
        }
        Ok(Some(removed))
    }

    fn ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.attestations.keys().cloned().collect())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.attestations.len())
    }

    fn all(&self) -> StoreResult<Vec<Attestation>> {
        Ok(self.attestations.values().cloned().collect())
    }

    fn by_group(&self, key: &GroupKey) -> StoreResult<Vec<Attestation>> {
        Ok(self
            .attestations
            .values()
            .filter(|a| a.in_group(key))
            .cloned()
            .collect())
    }

    fn contains_content(&self, hash: &Hash) -> StoreResult<bool> {
        Ok(self.by_content.contains_key(hash))
    }
}
