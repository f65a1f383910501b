//! QNTX attestation sync
//!
//! Native async side of sync. Two nodes holding overlapping attestation sets
//! run one symmetric [`Peer`] session each over a [`Conn`] and end up with
//! the union, exchanging only the groups whose Merkle hashes differ.
//!
//! The content hasher and Merkle tree live in `qntx-sync-core`; this crate
//! adds the shared tree handle, the store observer and backfill, the wire
//! protocol and the session state machine.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use qntx_sync::{conn, SharedStore, SyncConfig, SyncNode};
//! use qntx_sync_core::MemoryStore;
//!
//! # async fn example() -> qntx_sync::Result<()> {
//! let laptop = SyncNode::new(
//!     SyncConfig::named("laptop"),
//!     Arc::new(SharedStore::new(MemoryStore::new())),
//! )?;
//! let phone = SyncNode::new(
//!     SyncConfig::named("phone"),
//!     Arc::new(SharedStore::new(MemoryStore::new())),
//! )?;
//!
//! let (a, b) = conn::pair(16);
//! let (ours, theirs) = tokio::join!(laptop.reconcile(a), phone.reconcile(b));
//! assert!(ours.is_ok() && theirs.is_ok());
//! assert_eq!(laptop.status(), phone.status());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conn;
pub mod error;
pub mod node;
pub mod observer;
pub mod peer;
pub mod store;
pub mod tracing;
pub mod tree;
pub mod wire;

pub use config::{SessionLimits, SyncConfig};
pub use conn::{ChannelConn, Conn};
pub use error::{Result, SyncError};
pub use node::{SyncNode, SyncOutcome, SyncStatus};
pub use observer::{backfill, spawn_backfill, TreeObserver};
pub use peer::{Peer, SessionPhase, SessionStats};
pub use store::{SharedStore, SyncStore};
pub use tree::{SharedTree, TreeStatus};
pub use wire::{GroupHashEntry, SyncMessage};
