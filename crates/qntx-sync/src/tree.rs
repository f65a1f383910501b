//! Shared handle to a node's live Merkle tree.

use std::sync::Arc;

use parking_lot::RwLock;
use qntx_sync_core::sync::hex_encode;
use qntx_sync_core::{Attestation, Hash, MerkleTree};
use serde::{Deserialize, Serialize};

/// Single-writer/many-reader handle to a [`MerkleTree`].
///
/// Cloning the handle shares the tree. Sessions never hold the lock across an
/// await point: they take a [`snapshot`](SharedTree::snapshot) and negotiate
/// against that.
#[derive(Clone, Default)]
pub struct SharedTree {
    inner: Arc<RwLock<MerkleTree>>,
}

/// Summary of the tree for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStatus {
    pub root_hash: String,
    pub group_count: usize,
    pub attestation_count: usize,
}

impl SharedTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tree(tree: MerkleTree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    pub fn insert(&self, attestation: &Attestation) -> Hash {
        self.inner.write().insert(attestation)
    }

    pub fn remove(&self, attestation: &Attestation) -> Hash {
        self.inner.write().remove(attestation)
    }

    /// Bulk insert under one write lock. Returns how many leaves were new.
    pub fn extend<'a, I>(&self, attestations: I) -> usize
    where
        I: IntoIterator<Item = &'a Attestation>,
    {
        self.inner.write().extend(attestations)
    }

    pub fn clear(&self) {
        *self.inner.write() = MerkleTree::new();
    }

    pub fn root(&self) -> Hash {
        self.inner.read().root()
    }

    pub fn contains_hash(&self, content_hash: &Hash) -> bool {
        self.inner.read().contains_hash(content_hash)
    }

    /// Point-in-time copy for a session to negotiate against.
    pub fn snapshot(&self) -> MerkleTree {
        self.inner.read().clone()
    }

    pub fn status(&self) -> TreeStatus {
        let tree = self.inner.read();
        TreeStatus {
            root_hash: hex_encode(&tree.root()),
            group_count: tree.group_count(),
            attestation_count: tree.distinct_count(),
        }
    }
}

impl std::fmt::Debug for SharedTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("SharedTree")
            .field("root", &status.root_hash)
            .field("groups", &status.group_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qntx_sync_core::{content_hash, AttestationBuilder, ZERO_HASH};

    fn att(subject: &str) -> Attestation {
        AttestationBuilder::new()
            .id(format!("AS-{}", subject))
            .subject(subject)
            .predicate("member_of")
            .context("team")
            .actor("human:alice")
            .timestamp(1_700_000_000_000)
            .build()
    }

    #[test]
    fn clones_share_state() {
        let tree = SharedTree::new();
        let other = tree.clone();

        tree.insert(&att("ALICE"));
        assert_eq!(other.root(), tree.root());
        assert_ne!(other.root(), ZERO_HASH);
        assert!(other.contains_hash(&content_hash(&att("ALICE"))));
    }

    #[test]
    fn snapshot_is_detached() {
        let tree = SharedTree::new();
        tree.insert(&att("ALICE"));
        let snapshot = tree.snapshot();

        tree.insert(&att("BOB"));
        assert_ne!(snapshot.root(), tree.root());
        assert_eq!(snapshot.size(), 1);
    }

    #[test]
    fn status_and_clear() {
        let tree = SharedTree::new();
        assert_eq!(tree.extend([&att("ALICE"), &att("BOB"), &att("ALICE")]), 2);

        let status = tree.status();
        assert_eq!(status.group_count, 1);
        assert_eq!(status.attestation_count, 2);
        assert_eq!(status.root_hash.len(), 64);

        tree.clear();
        assert_eq!(tree.root(), ZERO_HASH);
        assert_eq!(tree.status().attestation_count, 0);
    }
}
