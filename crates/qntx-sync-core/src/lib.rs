//! QNTX Sync Core
//!
//! The runtime-neutral half of attestation sync, designed to run identically
//! in browser (WASM) and server (native) environments. Everything here is
//! plain data in, plain data out: no I/O, no async, no global state.
//!
//! - [`attestation`] - the claim model shared by every node
//! - [`sync`] - content hashing, the Merkle state digest, and a JSON bridge
//!   for hosts that can only pass strings
//! - [`storage`] - the store contract the sync engine consumes, plus an
//!   in-memory backend
//!
//! # Example
//!
//! ```rust
//! use qntx_sync_core::{AttestationBuilder, MerkleTree};
//!
//! let attestation = AttestationBuilder::new()
//!     .subject("ALICE")
//!     .predicate("is_author_of")
//!     .context("GitHub")
//!     .actor("human:bob")
//!     .timestamp(1718452800000)
//!     .source("cli")
//!     .build();
//!
//! let mut a = MerkleTree::new();
//! let mut b = MerkleTree::new();
//! a.insert(&attestation);
//! assert_ne!(a.root(), b.root());
//!
//! b.insert(&attestation);
//! assert_eq!(a.root(), b.root());
//! ```

pub mod attestation;
pub mod storage;
pub mod sync;

// Re-export main types at crate root
pub use attestation::{Attestation, AttestationBuilder};
pub use storage::{AttestationObserver, AttestationStore, MemoryStore, StoreError, StoreResult};
pub use sync::{
    content_hash, content_hash_hex, group_key_hash, GroupKey, Hash, MerkleDiff, MerkleTree,
    TreeBridge, ZERO_HASH,
};
