//! Keeps the live tree in step with the store.
//!
//! Store writes are forwarded through an unbounded channel to a background
//! task, so the store's write path never waits on the tree lock. The tree
//! may lag the store by whatever is still queued; [`TreeObserver::flush`]
//! waits that out.

use std::sync::Arc;

use qntx_sync_core::{Attestation, AttestationObserver};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::store::SyncStore;
use crate::tracing::prefix;
use crate::tree::SharedTree;

enum TreeEvent {
    Created(Attestation),
    Evicted(Attestation),
    Flush(oneshot::Sender<()>),
}

/// Store observer feeding the live tree.
#[derive(Clone)]
pub struct TreeObserver {
    tx: mpsc::UnboundedSender<TreeEvent>,
}

impl TreeObserver {
    /// Start the worker. It stops once every `TreeObserver` clone is dropped.
    pub fn spawn(tree: SharedTree) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(apply_events(tree, rx));
        (Self { tx }, handle)
    }

    /// Resolves once every event queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(TreeEvent::Flush(done_tx))
            .map_err(|_| SyncError::ObserverStopped)?;
        done_rx.await.map_err(|_| SyncError::ObserverStopped)
    }

    fn enqueue(&self, event: TreeEvent) {
        if self.tx.send(event).is_err() {
            warn!("{} tree observer stopped, dropping store event", prefix::SYNC);
        }
    }
}

impl AttestationObserver for TreeObserver {
    fn on_create(&self, attestation: &Attestation) {
        self.enqueue(TreeEvent::Created(attestation.clone()));
    }

    fn on_evict(&self, attestation: &Attestation) {
        self.enqueue(TreeEvent::Evicted(attestation.clone()));
    }
}

async fn apply_events(tree: SharedTree, mut rx: mpsc::UnboundedReceiver<TreeEvent>) {
    let mut created: Vec<Attestation> = Vec::new();

    while let Some(event) = rx.recv().await {
        let mut next = Some(event);
        // Drain whatever is already queued so bursts land under one lock.
        while let Some(event) = next.take() {
            match event {
                TreeEvent::Created(attestation) => created.push(attestation),
                TreeEvent::Evicted(attestation) => {
                    flush_created(&tree, &mut created);
                    tree.remove(&attestation);
                }
                TreeEvent::Flush(done) => {
                    flush_created(&tree, &mut created);
                    let _ = done.send(());
                }
            }
            next = rx.try_recv().ok();
        }
        flush_created(&tree, &mut created);
    }

    debug!("{} tree observer stopped", prefix::SYNC);
}

fn flush_created(tree: &SharedTree, created: &mut Vec<Attestation>) {
    if created.is_empty() {
        return;
    }
    tree.extend(created.iter());
    created.clear();
}

/// Insert everything the store holds into the tree.
///
/// Safe to run alongside live inserts: the tree is a set, so an attestation
/// seen by both paths lands once. Returns the number of new leaves.
pub async fn backfill(tree: &SharedTree, store: &dyn SyncStore) -> Result<usize> {
    let all = store.enumerate_all().await?;
    let added = tree.extend(all.iter());
    info!(
        "{} backfilled sync tree: {} attestations, {} new leaves",
        prefix::SYNC,
        all.len(),
        added
    );
    Ok(added)
}

/// Run [`backfill`] as a background task.
pub fn spawn_backfill(tree: SharedTree, store: Arc<dyn SyncStore>) -> JoinHandle<Result<usize>> {
    tokio::spawn(async move {
        let result = backfill(&tree, store.as_ref()).await;
        if let Err(e) = &result {
            warn!("{} sync tree backfill failed: {}", prefix::DB, e);
        }
        result
    })
}
