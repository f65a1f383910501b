//! Merkle tree state digest for attestation sync.
//!
//! Groups attestations by (actor, context) pair, the same unit bounded
//! storage evicts by, and computes hierarchical hashes for set reconciliation.
//!
//! ```text
//! Root
//! └── Group (actor, context pair)
//!     └── Leaf (attestation content hash)
//! ```
//!
//! Hashes are recomputed eagerly on every mutation, so reads (`root`,
//! `group_hashes`, `diff`) only need `&self` and can run under a shared lock.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::content::content_hash;
use super::{Hash, ZERO_HASH};
use crate::Attestation;

/// Identifies a bounded storage group: one (actor, context) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub actor: String,
    pub context: String,
}

impl GroupKey {
    pub fn new(actor: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            context: context.into(),
        }
    }

    /// The pre-hashed form exchanged on the wire.
    pub fn hash(&self) -> Hash {
        group_key_hash(self)
    }
}

/// Result of comparing local group hashes against a peer's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleDiff {
    /// Groups only this side has.
    pub local_only: Vec<Hash>,
    /// Groups only the peer has.
    pub remote_only: Vec<Hash>,
    /// Groups both sides have, with different contents.
    pub divergent: Vec<Hash>,
}

impl MerkleDiff {
    pub fn is_empty(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty() && self.divergent.is_empty()
    }

    /// Every group key hash that differs between the two sides.
    pub fn all(&self) -> BTreeSet<Hash> {
        self.local_only
            .iter()
            .chain(&self.remote_only)
            .chain(&self.divergent)
            .copied()
            .collect()
    }

    /// Groups this side should ask the peer for: the ones it lacks plus the
    /// divergent ones, in sorted order.
    pub fn wanted(&self) -> Vec<Hash> {
        let wanted: BTreeSet<Hash> = self
            .remote_only
            .iter()
            .chain(&self.divergent)
            .copied()
            .collect();
        wanted.into_iter().collect()
    }
}

/// In-memory Merkle tree mirroring the bounded storage hierarchy.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order. The tree is a
/// pure function of its set of (group, content hash) leaves: insertion order
/// never affects the root, duplicate inserts and removals of absent leaves
/// are no-ops, and an emptied group disappears entirely.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    groups: BTreeMap<Hash, Group>,
    // content hash → number of groups holding it
    index: HashMap<Hash, usize>,
    root: Hash,
}

#[derive(Debug, Clone)]
struct Group {
    key: GroupKey,
    leaves: BTreeSet<Hash>,
    hash: Hash,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self {
            groups: BTreeMap::new(),
            index: HashMap::new(),
            root: ZERO_HASH,
        }
    }

    /// Index an attestation under every (actor, context) group it belongs to.
    ///
    /// Returns the attestation's content hash.
    pub fn insert(&mut self, attestation: &Attestation) -> Hash {
        let hash = content_hash(attestation);
        let mut changed = false;
        for key in attestation.group_keys() {
            changed |= self.insert_leaf(key, hash).is_some();
        }
        if changed {
            self.recompute_root();
        }
        hash
    }

    /// Remove an attestation from every group it belongs to.
    ///
    /// Returns the attestation's content hash.
    pub fn remove(&mut self, attestation: &Attestation) -> Hash {
        let hash = content_hash(attestation);
        let mut changed = false;
        for key in attestation.group_keys() {
            changed |= self.remove_leaf(&key, &hash);
        }
        if changed {
            self.recompute_root();
        }
        hash
    }

    /// Insert a precomputed content hash under one group.
    ///
    /// Returns false if the leaf was already present.
    pub fn insert_hash(&mut self, key: GroupKey, content_hash: Hash) -> bool {
        let changed = self.insert_leaf(key, content_hash).is_some();
        if changed {
            self.recompute_root();
        }
        changed
    }

    /// Remove a content hash from one group.
    ///
    /// Returns false if the leaf was not present.
    pub fn remove_hash(&mut self, key: &GroupKey, content_hash: &Hash) -> bool {
        let changed = self.remove_leaf(key, content_hash);
        if changed {
            self.recompute_root();
        }
        changed
    }

    /// Bulk insert with a single root recomputation at the end.
    ///
    /// Returns the number of leaves that were actually added.
    pub fn extend<'a, I>(&mut self, attestations: I) -> usize
    where
        I: IntoIterator<Item = &'a Attestation>,
    {
        let mut added = 0;
        for attestation in attestations {
            let hash = content_hash(attestation);
            for key in attestation.group_keys() {
                if self.insert_leaf_deferred(key, hash) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            for group in self.groups.values_mut() {
                group.recompute_hash();
            }
            self.recompute_root();
        }
        added
    }

    /// Returns true if the content hash is a leaf of the given group.
    pub fn contains(&self, group_key_hash: &Hash, content_hash: &Hash) -> bool {
        self.groups
            .get(group_key_hash)
            .is_some_and(|g| g.leaves.contains(content_hash))
    }

    /// Returns true if the content hash exists in any group.
    pub fn contains_hash(&self, content_hash: &Hash) -> bool {
        self.index.contains_key(content_hash)
    }

    /// Get the root hash. An empty tree has the zero hash.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Get all group key hash → group hash pairs.
    pub fn group_hashes(&self) -> BTreeMap<Hash, Hash> {
        self.groups
            .iter()
            .map(|(gkh, group)| (*gkh, group.hash))
            .collect()
    }

    /// Compare against a peer's group hashes.
    pub fn diff(&self, remote: &BTreeMap<Hash, Hash>) -> MerkleDiff {
        let mut diff = MerkleDiff::default();

        for (gkh, group) in &self.groups {
            match remote.get(gkh) {
                None => diff.local_only.push(*gkh),
                Some(rhash) if *rhash != group.hash => diff.divergent.push(*gkh),
                _ => {}
            }
        }

        diff.remote_only = remote
            .keys()
            .filter(|gkh| !self.groups.contains_key(*gkh))
            .copied()
            .collect();

        diff
    }

    /// Find the GroupKey for a group key hash.
    pub fn find_group_key(&self, gkh: &Hash) -> Option<&GroupKey> {
        self.groups.get(gkh).map(|g| &g.key)
    }

    /// The content hashes held under one group, if the group exists.
    pub fn group_leaves(&self, gkh: &Hash) -> Option<&BTreeSet<Hash>> {
        self.groups.get(gkh).map(|g| &g.leaves)
    }

    /// Total leaves across all groups. An attestation in several groups counts once per group.
    pub fn size(&self) -> usize {
        self.groups.values().map(|g| g.leaves.len()).sum()
    }

    /// Number of distinct content hashes in the tree.
    pub fn distinct_count(&self) -> usize {
        self.index.len()
    }

    /// Number of (actor, context) groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Adds a leaf and refreshes its group hash. Returns the group key hash if the leaf was new.
    fn insert_leaf(&mut self, key: GroupKey, content_hash: Hash) -> Option<Hash> {
        let gkh = group_key_hash(&key);
        if !self.insert_leaf_deferred(key, content_hash) {
            return None;
        }
        if let Some(group) = self.groups.get_mut(&gkh) {
            group.recompute_hash();
        }
        Some(gkh)
    }

    /// Adds a leaf without touching any hash.
    fn insert_leaf_deferred(&mut self, key: GroupKey, content_hash: Hash) -> bool {
        let gkh = group_key_hash(&key);
        let group = self.groups.entry(gkh).or_insert_with(|| Group {
            key,
            leaves: BTreeSet::new(),
            hash: ZERO_HASH,
        });

        if !group.leaves.insert(content_hash) {
            return false;
        }
        *self.index.entry(content_hash).or_insert(0) += 1;
        true
    }

    fn remove_leaf(&mut self, key: &GroupKey, content_hash: &Hash) -> bool {
        let gkh = group_key_hash(key);
        let Some(group) = self.groups.get_mut(&gkh) else {
            return false;
        };
        if !group.leaves.remove(content_hash) {
            return false;
        }

        if group.leaves.is_empty() {
            self.groups.remove(&gkh);
        } else {
            group.recompute_hash();
        }

        if let Some(refs) = self.index.get_mut(content_hash) {
            *refs -= 1;
            if *refs == 0 {
                self.index.remove(content_hash);
            }
        }
        true
    }

    fn recompute_root(&mut self) {
        if self.groups.is_empty() {
            self.root = ZERO_HASH;
            return;
        }

        let mut hashes: Vec<Hash> = self.groups.values().map(|g| g.hash).collect();
        hashes.sort_unstable();

        let mut h = Sha256::new();
        h.update(b"root:");
        for gh in &hashes {
            h.update(gh);
        }
        self.root = h.finalize().into();
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    fn recompute_hash(&mut self) {
        if self.leaves.is_empty() {
            self.hash = ZERO_HASH;
            return;
        }

        let mut h = Sha256::new();
        h.update(b"grp:");
        // The key is part of the hash so identical leaf sets under
        // different (actor, context) pairs produce different group hashes.
        h.update(self.key.actor.as_bytes());
        h.update(b"\0");
        h.update(self.key.context.as_bytes());
        h.update(b"\0");
        // BTreeSet iterates in sorted order
        for leaf in &self.leaves {
            h.update(leaf);
        }
        self.hash = h.finalize().into();
    }
}

/// Compute deterministic hash of a GroupKey.
pub fn group_key_hash(key: &GroupKey) -> Hash {
    let mut h = Sha256::new();
    h.update(b"gk:");
    h.update(key.actor.as_bytes());
    h.update(b"\0");
    h.update(key.context.as_bytes());
    h.finalize().into()
}
