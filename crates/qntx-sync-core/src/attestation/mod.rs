//! Attestation types - the unit of data every node exchanges
//!
//! An attestation is an immutable claim about subjects, predicates, and
//! contexts with actor attribution and a timestamp. Claims are never edited;
//! a retraction is simply a newer attestation.
//!
//! # Example
//!
//! ```rust
//! use qntx_sync_core::attestation::AttestationBuilder;
//!
//! let attestation = AttestationBuilder::new()
//!     .subject("ALICE")
//!     .predicate("is_author_of")
//!     .context("GitHub")
//!     .actor("human:bob")
//!     .build();
//!
//! assert_eq!(attestation.subjects, vec!["ALICE"]);
//! assert_eq!(attestation.group_keys().len(), 1);
//! ```

mod types;

pub use types::{Attestation, AttestationBuilder};
