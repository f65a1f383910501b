//! A sync participant: configuration, live tree and store in one place.

use std::sync::Arc;

use qntx_sync_core::Attestation;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{SessionLimits, SyncConfig};
use crate::conn::Conn;
use crate::error::Result;
use crate::observer::{self, TreeObserver};
use crate::peer::Peer;
use crate::store::SyncStore;
use crate::tracing::prefix;
use crate::tree::{SharedTree, TreeStatus};

/// Status report: root hash, group count and attestation count.
pub type SyncStatus = TreeStatus;

/// Result of one reconciliation, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub sent: usize,
    pub received: usize,
    /// Either side hit a session limit
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct SyncNode {
    config: SyncConfig,
    tree: SharedTree,
    store: Arc<dyn SyncStore>,
}

impl SyncNode {
    /// Create a node with an empty tree. Call [`SyncNode::spawn_backfill`]
    /// (or [`SyncNode::rebuild`]) to load what the store already holds.
    pub fn new(config: SyncConfig, store: Arc<dyn SyncStore>) -> Result<Self> {
        config.validate()?;
        info!("{} sync node '{}' ready", prefix::PULSE_OPEN, config.name);
        Ok(Self {
            config,
            tree: SharedTree::new(),
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        self.tree.status()
    }

    /// Start a store observer for this node's tree. Subscribe the returned
    /// observer to the store.
    pub fn spawn_observer(&self) -> (TreeObserver, JoinHandle<()>) {
        TreeObserver::spawn(self.tree.clone())
    }

    pub fn spawn_backfill(&self) -> JoinHandle<Result<usize>> {
        observer::spawn_backfill(self.tree.clone(), Arc::clone(&self.store))
    }

    /// Drop the tree and reload it from the store.
    pub async fn rebuild(&self) -> Result<usize> {
        self.tree.clear();
        observer::backfill(&self.tree, self.store.as_ref()).await
    }

    /// Commit a local attestation and index it. Returns whether it was new.
    pub async fn attest(&self, attestation: Attestation) -> Result<bool> {
        let created = self.store.insert(attestation.clone()).await?;
        self.tree.insert(&attestation);
        Ok(created)
    }

    /// Reconcile with whoever is on the other end of `conn`.
    pub async fn reconcile<C: Conn>(&self, conn: C) -> SyncOutcome {
        self.reconcile_with_limits(conn, self.config.limits()).await
    }

    pub async fn reconcile_with_limits<C: Conn>(
        &self,
        conn: C,
        limits: SessionLimits,
    ) -> SyncOutcome {
        let mut peer = Peer::new(conn, self.tree.clone(), Arc::clone(&self.store))
            .with_limits(limits)
            .with_phase_timeout(self.config.phase_timeout())
            .with_name(self.config.name.clone());

        let result = peer.reconcile().await;
        let stats = peer.stats();
        let remote_partial = peer.remote_stats().is_some_and(|s| s.partial);

        let outcome = SyncOutcome {
            sent: stats.sent,
            received: stats.received,
            partial: stats.partial || remote_partial,
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        if let Err(e) = &result {
            warn!(
                "{} {} sync failed ({}) after sending {} and receiving {}: {}",
                prefix::SYNC,
                self.config.name,
                e.kind(),
                outcome.sent,
                outcome.received,
                e
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::pair;
    use crate::store::SharedStore;
    use crate::SyncError;
    use pretty_assertions::assert_eq;
    use qntx_sync_core::{AttestationBuilder, AttestationStore, MemoryStore, ZERO_HASH};

    fn att(id: &str, subject: &str) -> Attestation {
        AttestationBuilder::new()
            .id(id)
            .subject(subject)
            .predicate("prefers")
            .context("editor")
            .actor("human:alice")
            .timestamp(1_700_000_000_000)
            .build()
    }

    fn node(name: &str) -> (SyncNode, SharedStore<MemoryStore>) {
        let store = SharedStore::new(MemoryStore::new());
        let node = SyncNode::new(SyncConfig::named(name), Arc::new(store.clone())).unwrap();
        (node, store)
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SyncConfig {
            max_attestations: 0,
            ..SyncConfig::default()
        };
        let store = Arc::new(SharedStore::new(MemoryStore::new()));
        let result = SyncNode::new(config, store);
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn status_tracks_local_writes() {
        let (node, _) = node("a");
        assert_eq!(node.status().root_hash, "0".repeat(64));

        assert!(node.attest(att("AS-1", "VIM")).await.unwrap());
        assert!(!node.attest(att("AS-1b", "VIM")).await.unwrap());

        let status = node.status();
        assert_eq!(status.attestation_count, 1);
        assert_eq!(status.group_count, 1);
    }

    #[tokio::test]
    async fn rebuild_reloads_from_store() {
        let (node, store) = node("a");
        store.lock().put(att("AS-1", "VIM")).unwrap();
        assert_eq!(node.tree().root(), ZERO_HASH);

        assert_eq!(node.rebuild().await.unwrap(), 1);
        assert_ne!(node.tree().root(), ZERO_HASH);

        store.lock().delete("AS-1").unwrap();
        assert_eq!(node.rebuild().await.unwrap(), 0);
        assert_eq!(node.tree().root(), ZERO_HASH);
    }

    #[tokio::test]
    async fn reconcile_reports_outcome() {
        let (a, _) = node("a");
        let (b, _) = node("b");
        a.attest(att("AS-1", "VIM")).await.unwrap();

        let (conn_a, conn_b) = pair(8);
        let (oa, ob) = tokio::join!(a.reconcile(conn_a), b.reconcile(conn_b));

        assert_eq!(
            oa,
            SyncOutcome {
                sent: 1,
                received: 0,
                partial: false,
                error: None
            }
        );
        assert_eq!(ob.received, 1);
        assert!(ob.is_ok());
        assert_eq!(a.status(), b.status());
    }

    #[tokio::test]
    async fn dropped_connection_is_reported() {
        let (a, _) = node("a");
        let (conn_a, conn_b) = pair(8);
        drop(conn_b);

        let outcome = a.reconcile(conn_a).await;
        assert!(!outcome.is_ok());
        assert_eq!(outcome.error.as_deref(), Some("connection closed"));
    }
}
