//! Symmetric reconciliation session.
//!
//! Both ends run the same state machine; there is no initiator role. Each
//! phase sends first and then receives, so two peers never wait on each
//! other:
//!
//! ```text
//! Hello ──(roots equal)──────────────────────────────┐
//!   │                                                ▼
//!   └─► GroupHashes ─► Need ─► Attestations ─────► Done
//! ```
//!
//! Negotiation runs against a snapshot of the tree taken when the session
//! starts. Received attestations are applied to the live tree and store.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use qntx_sync_core::sync::hex_encode;
use qntx_sync_core::{content_hash, Attestation, Hash, MerkleTree, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{SessionLimits, DEFAULT_PHASE_TIMEOUT_SECS};
use crate::conn::Conn;
use crate::error::{Result, SyncError};
use crate::store::SyncStore;
use crate::tracing::prefix;
use crate::tree::SharedTree;
use crate::wire::{self, SyncMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Hello,
    GroupHashes,
    Need,
    Attestations,
    Done,
}

/// Transfer counts for one side of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub sent: usize,
    pub received: usize,
    /// A session limit was hit; another session is needed to converge.
    pub partial: bool,
}

/// One reconciliation session over one connection.
pub struct Peer<C> {
    conn: C,
    tree: SharedTree,
    store: Arc<dyn SyncStore>,
    limits: SessionLimits,
    phase_timeout: Duration,
    name: String,
    phase: SessionPhase,
    stats: SessionStats,
    remote_stats: Option<SessionStats>,
}

impl<C: Conn> Peer<C> {
    pub fn new(conn: C, tree: SharedTree, store: Arc<dyn SyncStore>) -> Self {
        Self {
            conn,
            tree,
            store,
            limits: SessionLimits::default(),
            phase_timeout: Duration::from_secs(DEFAULT_PHASE_TIMEOUT_SECS),
            name: "peer".to_string(),
            phase: SessionPhase::Idle,
            stats: SessionStats::default(),
            remote_stats: None,
        }
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = timeout;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Counts so far. Valid after an aborted session too.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// What the peer reported in its `sync_done`.
    pub fn remote_stats(&self) -> Option<SessionStats> {
        self.remote_stats
    }

    /// Run the session to completion.
    ///
    /// On any error the connection is closed and the error returned.
    /// Attestations already applied stay applied.
    pub async fn reconcile(&mut self) -> Result<SessionStats> {
        match self.run().await {
            Ok(()) => {
                info!(
                    "{} {} sync complete: sent {}, received {}{}",
                    prefix::SYNC,
                    self.name,
                    self.stats.sent,
                    self.stats.received,
                    if self.stats.partial { " (partial)" } else { "" }
                );
                Ok(self.stats)
            }
            Err(e) => {
                warn!(
                    "{} {} sync aborted during {:?}: {}",
                    prefix::SYNC,
                    self.name,
                    self.phase,
                    e
                );
                let _ = self.conn.close().await;
                Err(e)
            }
        }
    }

    async fn run(&mut self) -> Result<()> {
        let snapshot = self.tree.snapshot();
        let local_root = snapshot.root();

        self.enter(SessionPhase::Hello);
        self.conn
            .send(&SyncMessage::Hello {
                root_hash: hex_encode(&local_root),
            })
            .await?;
        let remote_root = match self.recv("sync_hello").await? {
            SyncMessage::Hello { root_hash } => wire::decode_hash(&root_hash)?,
            other => return Err(unexpected("sync_hello", &other)),
        };

        if remote_root == local_root {
            debug!("{} {} roots match, nothing to exchange", prefix::SYNC, self.name);
            return self.finish().await;
        }

        self.enter(SessionPhase::GroupHashes);
        self.conn
            .send(&SyncMessage::GroupHashes {
                groups: wire::encode_groups(&snapshot.group_hashes()),
            })
            .await?;
        let remote_groups = match self.recv("sync_group_hashes").await? {
            SyncMessage::GroupHashes { groups } => wire::decode_groups(&groups)?,
            other => return Err(unexpected("sync_group_hashes", &other)),
        };

        self.enter(SessionPhase::Need);
        let (need, have) = self.build_need(&snapshot, &remote_groups);
        self.conn.send(&SyncMessage::Need { need, have }).await?;
        let (peer_need, peer_have) = match self.recv("sync_need").await? {
            SyncMessage::Need { need, have } => (need, have),
            other => return Err(unexpected("sync_need", &other)),
        };

        self.enter(SessionPhase::Attestations);
        let outgoing = self
            .collect_requested(&snapshot, &peer_need, &peer_have)
            .await?;
        self.stats.sent = outgoing.len();
        self.conn
            .send(&SyncMessage::Attestations {
                attestations: outgoing,
            })
            .await?;
        let incoming = match self.recv("sync_attestations").await? {
            SyncMessage::Attestations { attestations } => attestations,
            other => return Err(unexpected("sync_attestations", &other)),
        };
        self.apply_received(incoming).await?;

        self.finish().await
    }

    /// Groups to request from the peer, plus what we already hold in each
    /// divergent one.
    fn build_need(
        &mut self,
        snapshot: &MerkleTree,
        remote: &BTreeMap<Hash, Hash>,
    ) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
        let diff = snapshot.diff(remote);
        debug!(
            "{} {} diff: {} local only, {} remote only, {} divergent",
            prefix::SYNC,
            self.name,
            diff.local_only.len(),
            diff.remote_only.len(),
            diff.divergent.len()
        );

        let mut wanted = diff.wanted();
        if wanted.len() > self.limits.max_groups {
            debug!(
                "{} {} requesting {} of {} groups",
                prefix::SYNC,
                self.name,
                self.limits.max_groups,
                wanted.len()
            );
            wanted.truncate(self.limits.max_groups);
            self.stats.partial = true;
        }

        let divergent: BTreeSet<&Hash> = diff.divergent.iter().collect();
        let mut have = BTreeMap::new();
        for gkh in wanted.iter().filter(|gkh| divergent.contains(gkh)) {
            if let Some(leaves) = snapshot.group_leaves(gkh) {
                have.insert(hex_encode(gkh), leaves.iter().map(hex_encode).collect());
            }
        }

        (wanted.iter().map(hex_encode).collect(), have)
    }

    /// Attestations answering the peer's need, in content-hash order within
    /// each group, at most `max_attestations` in total.
    async fn collect_requested(
        &mut self,
        snapshot: &MerkleTree,
        need: &[String],
        have: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<Attestation>> {
        let mut peer_has: BTreeMap<Hash, BTreeSet<Hash>> = BTreeMap::new();
        for (gkh, hashes) in have {
            peer_has.insert(wire::decode_hash(gkh)?, wire::decode_hash_set(hashes)?);
        }

        let requested = if need.len() > self.limits.max_groups {
            self.stats.partial = true;
            &need[..self.limits.max_groups]
        } else {
            need
        };

        let max = self.limits.max_attestations;
        let mut out = Vec::new();
        let mut queued: HashSet<Hash> = HashSet::new();
        let empty = BTreeSet::new();

        'groups: for gkh_hex in requested {
            let gkh = wire::decode_hash(gkh_hex)?;
            let Some(key) = snapshot.find_group_key(&gkh).cloned() else {
                debug!(
                    "{} {} peer asked for unknown group {}",
                    prefix::SYNC,
                    self.name,
                    gkh_hex
                );
                continue;
            };
            let skip = peer_has.get(&gkh).unwrap_or(&empty);

            let mut group: Vec<(Hash, Attestation)> = self
                .store
                .attestations_for_group(&key)
                .await?
                .into_iter()
                .map(|a| (content_hash(&a), a))
                .collect();
            group.sort_by(|a, b| a.0.cmp(&b.0));

            for (hash, attestation) in group {
                if skip.contains(&hash) || queued.contains(&hash) {
                    continue;
                }
                if out.len() >= max {
                    self.stats.partial = true;
                    break 'groups;
                }
                queued.insert(hash);
                out.push(attestation);
            }
        }

        Ok(out)
    }

    /// Commit what the peer sent. Digests already held are skipped and do
    /// not count toward `max_attestations`.
    async fn apply_received(&mut self, incoming: Vec<Attestation>) -> Result<()> {
        for mut attestation in incoming {
            let hash = content_hash(&attestation);
            if self.tree.contains_hash(&hash) {
                continue;
            }
            if self.stats.received >= self.limits.max_attestations {
                warn!(
                    "{} {} received cap of {} reached, deferring the rest",
                    prefix::SYNC,
                    self.name,
                    self.limits.max_attestations
                );
                self.stats.partial = true;
                break;
            }

            attestation.created_at = Utc::now().timestamp_millis();
            match self.store.insert(attestation.clone()).await {
                Ok(created) => {
                    self.tree.insert(&attestation);
                    if created {
                        self.stats.received += 1;
                    }
                }
                Err(StoreError::IdConflict(id)) => {
                    warn!(
                        "{} {} skipping {}: ID already used by different content",
                        prefix::DB,
                        self.name,
                        id
                    );
                }
                Err(StoreError::InvalidData(reason)) => {
                    warn!(
                        "{} {} skipping invalid attestation: {}",
                        prefix::DB,
                        self.name,
                        reason
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.enter(SessionPhase::Done);
        self.conn
            .send(&SyncMessage::Done {
                sent: self.stats.sent,
                received: self.stats.received,
                partial: self.stats.partial,
            })
            .await?;
        match self.recv("sync_done").await? {
            SyncMessage::Done {
                sent,
                received,
                partial,
            } => {
                self.remote_stats = Some(SessionStats {
                    sent,
                    received,
                    partial,
                });
            }
            other => return Err(unexpected("sync_done", &other)),
        }
        self.conn.close().await
    }

    async fn recv(&mut self, expected: &'static str) -> Result<SyncMessage> {
        match tokio::time::timeout(self.phase_timeout, self.conn.receive()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(expected)),
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        debug!("{} {} → {:?}", prefix::SYNC, self.name, phase);
        self.phase = phase;
    }
}

fn unexpected(expected: &'static str, got: &SyncMessage) -> SyncError {
    SyncError::UnexpectedMessage {
        expected,
        got: got.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{pair, ChannelConn};
    use crate::store::SharedStore;
    use pretty_assertions::assert_eq;
    use qntx_sync_core::{AttestationBuilder, AttestationStore, GroupKey, MemoryStore};

    fn att(id: &str, subject: &str) -> Attestation {
        AttestationBuilder::new()
            .id(id)
            .subject(subject)
            .predicate("knows")
            .context("work")
            .actor("human:alice")
            .timestamp(1_700_000_000_000)
            .source("cli")
            .build()
    }

    fn side(attestations: &[Attestation]) -> (SharedTree, SharedStore<MemoryStore>) {
        let tree = SharedTree::new();
        let store = SharedStore::new(MemoryStore::new());
        for a in attestations {
            store.lock().put(a.clone()).unwrap();
            tree.insert(a);
        }
        (tree, store)
    }

    fn peer(
        conn: ChannelConn,
        tree: &SharedTree,
        store: &SharedStore<MemoryStore>,
    ) -> Peer<ChannelConn> {
        Peer::new(conn, tree.clone(), Arc::new(store.clone()))
            .with_phase_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn one_attestation_transfers() {
        let (tree_a, store_a) = side(&[att("AS-1", "BOB")]);
        let (tree_b, store_b) = side(&[]);
        let (conn_a, conn_b) = pair(8);

        let mut a = peer(conn_a, &tree_a, &store_a).with_name("a");
        let mut b = peer(conn_b, &tree_b, &store_b).with_name("b");
        let (ra, rb) = tokio::join!(a.reconcile(), b.reconcile());

        assert_eq!(
            ra.unwrap(),
            SessionStats {
                sent: 1,
                received: 0,
                partial: false
            }
        );
        assert_eq!(
            rb.unwrap(),
            SessionStats {
                sent: 0,
                received: 1,
                partial: false
            }
        );
        assert_eq!(a.remote_stats(), Some(b.stats()));
        assert_eq!(a.phase(), SessionPhase::Done);
        assert_eq!(tree_a.root(), tree_b.root());

        let stored = store_b.lock().get("AS-1").unwrap().unwrap();
        assert!(stored.created_at > 0);
    }

    #[tokio::test]
    async fn equal_roots_exchange_nothing() {
        let shared = [att("AS-1", "BOB"), att("AS-2", "CAROL")];
        let (tree_a, store_a) = side(&shared);
        let (tree_b, _store_b) = side(&shared);
        let (conn_a, mut conn_b) = pair(8);

        let mut a = peer(conn_a, &tree_a, &store_a);
        let script = async {
            // Hello, then straight to Done
            let hello = conn_b.receive().await.unwrap();
            assert_eq!(hello.kind(), "sync_hello");
            conn_b
                .send(&SyncMessage::Hello {
                    root_hash: hex_encode(&tree_b.root()),
                })
                .await
                .unwrap();
            let done = conn_b.receive().await.unwrap();
            assert_eq!(done.kind(), "sync_done");
            conn_b
                .send(&SyncMessage::Done {
                    sent: 0,
                    received: 0,
                    partial: false,
                })
                .await
                .unwrap();
        };
        let (result, ()) = tokio::join!(a.reconcile(), script);

        assert_eq!(result.unwrap(), SessionStats::default());
        assert_eq!(a.remote_stats(), Some(SessionStats::default()));
    }

    #[tokio::test]
    async fn sender_skips_what_requester_has() {
        let (tree_a, store_a) = side(&[att("AS-1", "BOB"), att("AS-2", "CAROL")]);
        let (conn_a, mut conn_b) = pair(8);
        let mut a = peer(conn_a, &tree_a, &store_a);

        let gkh = GroupKey::new("human:alice", "work").hash();
        let bob = content_hash(&att("AS-1", "BOB"));

        let script = async {
            conn_b.receive().await.unwrap();
            conn_b
                .send(&SyncMessage::Hello {
                    root_hash: hex_encode(&[9u8; 32]),
                })
                .await
                .unwrap();
            conn_b.receive().await.unwrap();
            conn_b
                .send(&SyncMessage::GroupHashes {
                    groups: vec![wire::GroupHashEntry {
                        group_key_hash: hex_encode(&gkh),
                        group_hash: hex_encode(&[9u8; 32]),
                    }],
                })
                .await
                .unwrap();
            conn_b.receive().await.unwrap();
            conn_b
                .send(&SyncMessage::Need {
                    need: vec![hex_encode(&gkh)],
                    have: BTreeMap::from([(hex_encode(&gkh), vec![hex_encode(&bob)])]),
                })
                .await
                .unwrap();
            let sent = conn_b.receive().await.unwrap();
            conn_b
                .send(&SyncMessage::Attestations {
                    attestations: vec![],
                })
                .await
                .unwrap();
            conn_b.receive().await.unwrap();
            conn_b
                .send(&SyncMessage::Done {
                    sent: 0,
                    received: 1,
                    partial: false,
                })
                .await
                .unwrap();
            sent
        };
        let (result, sent) = tokio::join!(a.reconcile(), script);

        assert_eq!(result.unwrap().sent, 1);
        match sent {
            SyncMessage::Attestations { attestations } => {
                assert_eq!(attestations.len(), 1);
                assert_eq!(attestations[0].subjects, vec!["CAROL".to_string()]);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn out_of_sequence_message_aborts() {
        let (tree_a, store_a) = side(&[att("AS-1", "BOB")]);
        let (conn_a, mut conn_b) = pair(8);
        let mut a = peer(conn_a, &tree_a, &store_a);

        let script = async {
            conn_b.receive().await.unwrap();
            conn_b
                .send(&SyncMessage::Attestations {
                    attestations: vec![],
                })
                .await
                .unwrap();
        };
        let (result, ()) = tokio::join!(a.reconcile(), script);

        match result {
            Err(SyncError::UnexpectedMessage { expected, got }) => {
                assert_eq!(expected, "sync_hello");
                assert_eq!(got, "sync_attestations");
            }
            other => panic!("expected protocol violation, got {:?}", other),
        }
        assert_eq!(a.phase(), SessionPhase::Hello);
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (tree_a, store_a) = side(&[]);
        let (conn_a, _conn_b) = pair(8);
        let mut a = peer(conn_a, &tree_a, &store_a).with_phase_timeout(Duration::from_millis(50));

        let result = a.reconcile().await;
        assert!(matches!(result, Err(SyncError::Timeout("sync_hello"))));
    }
}
