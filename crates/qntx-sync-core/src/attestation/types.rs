//! Attestation type definitions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::sync::GroupKey;

/// An attestation - an immutable claim about subjects, predicates, and contexts
/// with actor attribution and timestamps.
///
/// Only `subjects`, `predicates`, `contexts`, `actors`, `timestamp` and
/// `source` carry meaning for sync. `id`, `attributes` and `created_at` are
/// local identity and metadata and never influence the content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    /// ASID: AS + UUID (e.g., "AS-550e8400-e29b-41d4-a716-446655440000")
    pub id: String,

    /// Entities being attested about
    pub subjects: Vec<String>,

    /// What is being claimed (the relationship/property)
    pub predicates: Vec<String>,

    /// Context for the claim (e.g., "GitHub", "2024")
    pub contexts: Vec<String>,

    /// Who made the attestation
    pub actors: Vec<String>,

    /// When attestation was made (Unix timestamp milliseconds)
    pub timestamp: i64,

    /// How attestation was created (e.g., "cli", "api", "sync")
    pub source: String,

    /// Arbitrary JSON attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Database creation time (Unix timestamp milliseconds).
    /// Defaults to 0 when absent (e.g. content hashing omits it deliberately).
    #[serde(default)]
    pub created_at: i64,
}

impl Attestation {
    /// Every (actor, context) group this attestation is indexed under.
    ///
    /// The cross product of actors and contexts, deduplicated and sorted.
    /// An attestation without actors or without contexts belongs to no group.
    pub fn group_keys(&self) -> Vec<GroupKey> {
        let mut keys = BTreeSet::new();
        for actor in &self.actors {
            for context in &self.contexts {
                keys.insert(GroupKey::new(actor.as_str(), context.as_str()));
            }
        }
        keys.into_iter().collect()
    }

    /// Returns true if this attestation is indexed under the given group.
    pub fn in_group(&self, key: &GroupKey) -> bool {
        self.actors.iter().any(|a| *a == key.actor)
            && self.contexts.iter().any(|c| *c == key.context)
    }
}

impl Default for Attestation {
    fn default() -> Self {
        Self {
            id: String::new(),
            subjects: Vec::new(),
            predicates: vec!["_".to_string()],
            contexts: vec!["_".to_string()],
            actors: Vec::new(),
            timestamp: 0,
            source: String::new(),
            attributes: HashMap::new(),
            created_at: 0,
        }
    }
}

/// Builder for creating attestations
#[derive(Debug, Default)]
pub struct AttestationBuilder {
    attestation: Attestation,
}

impl AttestationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.attestation.id = id.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.attestation.subjects.push(subject.into());
        self
    }

    pub fn subjects(mut self, subjects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attestation
            .subjects
            .extend(subjects.into_iter().map(|s| s.into()));
        self
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        // Clear default "_" if we're adding a real predicate
        if self.attestation.predicates == vec!["_"] {
            self.attestation.predicates.clear();
        }
        self.attestation.predicates.push(predicate.into());
        self
    }

    pub fn predicates(mut self, predicates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if self.attestation.predicates == vec!["_"] {
            self.attestation.predicates.clear();
        }
        self.attestation
            .predicates
            .extend(predicates.into_iter().map(|s| s.into()));
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        if self.attestation.contexts == vec!["_"] {
            self.attestation.contexts.clear();
        }
        self.attestation.contexts.push(context.into());
        self
    }

    pub fn contexts(mut self, contexts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if self.attestation.contexts == vec!["_"] {
            self.attestation.contexts.clear();
        }
        self.attestation
            .contexts
            .extend(contexts.into_iter().map(|s| s.into()));
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.attestation.actors.push(actor.into());
        self
    }

    pub fn actors(mut self, actors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attestation
            .actors
            .extend(actors.into_iter().map(|s| s.into()));
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.attestation.timestamp = timestamp;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.attestation.source = source.into();
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attestation.attributes.insert(key.into(), value);
        self
    }

    pub fn created_at(mut self, created_at: i64) -> Self {
        self.attestation.created_at = created_at;
        self
    }

    pub fn build(self) -> Attestation {
        self.attestation
    }
}
