//! JSON bridge over one Merkle tree instance.
//!
//! Hosts that can only exchange strings (the Go server via wazero, the
//! browser via wasm-bindgen) drive the tree through these calls. Every
//! method takes a JSON document and returns one; failures come back as
//! `{"error":"..."}` rather than panicking across the boundary.
//!
//! The bridge owns its tree. The host decides how many bridges exist and
//! who holds them; nothing here is global.

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

use super::content::{content_hash_hex, hex_decode, hex_encode};
use super::merkle::{GroupKey, MerkleTree};
use super::Hash;
use crate::Attestation;

#[derive(Deserialize)]
struct LeafInput {
    actor: String,
    context: String,
    content_hash: String,
}

#[derive(Deserialize)]
struct ContainsInput {
    content_hash: String,
    #[serde(default)]
    group_key_hash: Option<String>,
}

#[derive(Deserialize)]
struct GroupKeyInput {
    group_key_hash: String,
}

#[derive(Deserialize)]
struct DiffInput {
    remote: BTreeMap<String, String>,
}

/// A Merkle tree driven through JSON strings.
#[derive(Debug, Clone, Default)]
pub struct TreeBridge {
    tree: MerkleTree,
}

impl TreeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the underlying tree.
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Index a full attestation under all of its groups.
    /// Input: JSON-serialized Attestation
    /// Output: `{"hash":"<hex>"}`
    pub fn insert_attestation(&mut self, input: &str) -> String {
        match serde_json::from_str::<Attestation>(input) {
            Ok(att) => {
                self.tree.insert(&att);
                json!({ "hash": content_hash_hex(&att) }).to_string()
            }
            Err(e) => error(format!("invalid attestation JSON: {}", e)),
        }
    }

    /// Remove a full attestation from all of its groups.
    /// Input: JSON-serialized Attestation
    /// Output: `{"hash":"<hex>"}`
    pub fn remove_attestation(&mut self, input: &str) -> String {
        match serde_json::from_str::<Attestation>(input) {
            Ok(att) => {
                self.tree.remove(&att);
                json!({ "hash": content_hash_hex(&att) }).to_string()
            }
            Err(e) => error(format!("invalid attestation JSON: {}", e)),
        }
    }

    /// Insert a precomputed content hash.
    /// Input: `{"actor":"...","context":"...","content_hash":"<hex>"}`
    /// Output: `{"ok":true}` or `{"error":"..."}`
    pub fn insert(&mut self, input: &str) -> String {
        match parse_leaf(input) {
            Ok((key, hash)) => {
                self.tree.insert_hash(key, hash);
                json!({ "ok": true }).to_string()
            }
            Err(e) => error(e),
        }
    }

    /// Remove a precomputed content hash.
    /// Input: `{"actor":"...","context":"...","content_hash":"<hex>"}`
    /// Output: `{"ok":true}`
    pub fn remove(&mut self, input: &str) -> String {
        match parse_leaf(input) {
            Ok((key, hash)) => {
                self.tree.remove_hash(&key, &hash);
                json!({ "ok": true }).to_string()
            }
            Err(e) => error(e),
        }
    }

    /// Check for a content hash, optionally scoped to one group.
    /// Input: `{"content_hash":"<hex>"}` or `{"content_hash":"<hex>","group_key_hash":"<hex>"}`
    /// Output: `{"exists":true}` or `{"exists":false}`
    pub fn contains(&self, input: &str) -> String {
        let parsed: ContainsInput = match serde_json::from_str(input) {
            Ok(v) => v,
            Err(e) => return error(format!("invalid JSON: {}", e)),
        };
        let hash = match decode(&parsed.content_hash, "content_hash") {
            Ok(h) => h,
            Err(e) => return error(e),
        };

        let exists = match parsed.group_key_hash {
            Some(gkh_hex) => match decode(&gkh_hex, "group_key_hash") {
                Ok(gkh) => self.tree.contains(&gkh, &hash),
                Err(e) => return error(e),
            },
            None => self.tree.contains_hash(&hash),
        };
        json!({ "exists": exists }).to_string()
    }

    /// Output: `{"root":"<hex>","size":N,"groups":N}`
    pub fn root(&self) -> String {
        json!({
            "root": hex_encode(&self.tree.root()),
            "size": self.tree.size(),
            "groups": self.tree.group_count(),
        })
        .to_string()
    }

    /// Output: `{"groups":{"<hex_gkh>":"<hex_ghash>",...}}`
    pub fn group_hashes(&self) -> String {
        let groups: BTreeMap<String, String> = self
            .tree
            .group_hashes()
            .iter()
            .map(|(k, v)| (hex_encode(k), hex_encode(v)))
            .collect();
        json!({ "groups": groups }).to_string()
    }

    /// Diff against a peer's group hashes.
    /// Input: `{"remote":{"<hex_gkh>":"<hex_ghash>",...}}`
    /// Output: `{"local_only":[...],"remote_only":[...],"divergent":[...]}`
    pub fn diff(&self, input: &str) -> String {
        let parsed: DiffInput = match serde_json::from_str(input) {
            Ok(v) => v,
            Err(e) => return error(format!("invalid JSON: {}", e)),
        };

        let mut remote = BTreeMap::new();
        for (k_hex, v_hex) in &parsed.remote {
            let k = match decode(k_hex, "group key") {
                Ok(h) => h,
                Err(e) => return error(e),
            };
            let v = match decode(v_hex, "group hash") {
                Ok(h) => h,
                Err(e) => return error(e),
            };
            remote.insert(k, v);
        }

        let diff = self.tree.diff(&remote);
        json!({
            "local_only": hex_list(&diff.local_only),
            "remote_only": hex_list(&diff.remote_only),
            "divergent": hex_list(&diff.divergent),
        })
        .to_string()
    }

    /// Reverse-lookup a group key hash.
    /// Input: `{"group_key_hash":"<hex>"}`
    /// Output: `{"actor":"...","context":"..."}` or `{"error":"group not found"}`
    pub fn find_group_key(&self, input: &str) -> String {
        let parsed: GroupKeyInput = match serde_json::from_str(input) {
            Ok(v) => v,
            Err(e) => return error(format!("invalid JSON: {}", e)),
        };
        let gkh = match decode(&parsed.group_key_hash, "group_key_hash") {
            Ok(h) => h,
            Err(e) => return error(e),
        };
        match self.tree.find_group_key(&gkh) {
            Some(key) => json!({ "actor": key.actor, "context": key.context }).to_string(),
            None => error(format!("group not found: {}", parsed.group_key_hash)),
        }
    }
}

fn parse_leaf(input: &str) -> Result<(GroupKey, Hash), String> {
    let parsed: LeafInput =
        serde_json::from_str(input).map_err(|e| format!("invalid JSON: {}", e))?;
    let hash = decode(&parsed.content_hash, "content_hash")?;
    Ok((GroupKey::new(parsed.actor, parsed.context), hash))
}

fn decode(hex: &str, what: &str) -> Result<Hash, String> {
    hex_decode(hex).ok_or_else(|| format!("invalid hex {} (expected 64 chars): {}", what, hex))
}

fn hex_list(hashes: &[Hash]) -> Vec<String> {
    hashes.iter().map(hex_encode).collect()
}

fn error(msg: impl Into<String>) -> String {
    json!({ "error": msg.into() }).to_string()
}
