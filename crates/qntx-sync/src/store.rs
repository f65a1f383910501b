//! Async store collaborator used by sync sessions and backfill.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use qntx_sync_core::{Attestation, AttestationStore, GroupKey, StoreResult};

/// What a sync session needs from the durable attestation store.
///
/// `insert` must be idempotent by content: committing an attestation whose
/// content hash is already stored returns `Ok(false)`.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Every attestation currently held.
    async fn enumerate_all(&self) -> StoreResult<Vec<Attestation>>;

    /// Attestations indexed under one (actor, context) group.
    async fn attestations_for_group(&self, key: &GroupKey) -> StoreResult<Vec<Attestation>> {
        Ok(self
            .enumerate_all()
            .await?
            .into_iter()
            .filter(|a| a.in_group(key))
            .collect())
    }

    /// Commit an attestation. Returns whether it was new.
    async fn insert(&self, attestation: Attestation) -> StoreResult<bool>;
}

/// Adapts any synchronous [`AttestationStore`] into a [`SyncStore`].
///
/// The lock is held only for the duration of each call, never across an
/// await.
pub struct SharedStore<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AttestationStore> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Direct access for local writes and test setup.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock()
    }
}

#[async_trait]
impl<S> SyncStore for SharedStore<S>
where
    S: AttestationStore + Send + 'static,
{
    async fn enumerate_all(&self) -> StoreResult<Vec<Attestation>> {
        self.inner.lock().all()
    }

    async fn attestations_for_group(&self, key: &GroupKey) -> StoreResult<Vec<Attestation>> {
        self.inner.lock().by_group(key)
    }

    async fn insert(&self, attestation: Attestation) -> StoreResult<bool> {
        self.inner.lock().put(attestation)
    }
}
