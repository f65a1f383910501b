//! Content-addressed attestation sync primitives.
//!
//! Provides deterministic content hashing and a Merkle tree state digest
//! for efficient peer-to-peer attestation reconciliation.
//!
//! Content hashing produces the same SHA-256 digest for semantically identical
//! attestations regardless of ASID, attributes, or creation time. The Merkle
//! tree groups attestations by (actor, context) pairs so two peers can narrow
//! a full-store comparison down to the few groups that actually differ.
//!
//! [`TreeBridge`] wraps one tree instance behind string-in/string-out JSON
//! calls for hosts that cannot share Rust types (wazero, browsers).

mod bridge;
mod content;
mod merkle;

/// A SHA-256 digest: content hashes, group key hashes, group and root hashes.
pub type Hash = [u8; 32];

/// Root hash of an empty tree.
pub const ZERO_HASH: Hash = [0u8; 32];

pub use bridge::TreeBridge;
pub use content::{content_hash, content_hash_hex, content_hash_json, hex_decode, hex_encode};
pub use merkle::{group_key_hash, GroupKey, MerkleDiff, MerkleTree};
