//! Storage abstraction for attestations
//!
//! Sync treats the durable store as an external collaborator. This module
//! pins down the little it needs from one:
//!
//! - enumerate everything (startup backfill)
//! - list one (actor, context) group (answering a peer's need list)
//! - commit idempotently by content (applying what a peer sent)
//! - tell someone when an attestation is created or evicted
//!
//! [`MemoryStore`] implements the contract in memory for tests and
//! short-lived processes. Persistent backends live in their own crates.
//!
//! # Example
//!
//! ```rust
//! use qntx_sync_core::storage::{AttestationStore, MemoryStore};
//! use qntx_sync_core::attestation::AttestationBuilder;
//!
//! let mut store = MemoryStore::new();
//!
//! let attestation = AttestationBuilder::new()
//!     .id("AS-test-123")
//!     .subject("ALICE")
//!     .predicate("knows")
//!     .context("work")
//!     .actor("human:bob")
//!     .build();
//!
//! assert!(store.put(attestation.clone()).unwrap());
//! // Same content again is a no-op
//! assert!(!store.put(attestation).unwrap());
//! assert_eq!(store.count().unwrap(), 1);
//! ```

mod error;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::{AttestationObserver, AttestationStore};
