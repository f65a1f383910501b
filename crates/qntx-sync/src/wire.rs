//! Sync wire messages.
//!
//! Every message is a JSON object tagged by `"type"`. Hashes travel as
//! 64-char lowercase hex.

use std::collections::{BTreeMap, BTreeSet};

use qntx_sync_core::sync::{hex_decode, hex_encode};
use qntx_sync_core::{Attestation, Hash};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// One group's digest as exchanged in `sync_group_hashes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHashEntry {
    pub group_key_hash: String,
    pub group_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    #[serde(rename = "sync_hello")]
    Hello { root_hash: String },

    #[serde(rename = "sync_group_hashes")]
    GroupHashes { groups: Vec<GroupHashEntry> },

    #[serde(rename = "sync_need")]
    Need {
        need: Vec<String>,
        /// Content hashes the requester already holds, per divergent group
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        have: BTreeMap<String, Vec<String>>,
    },

    #[serde(rename = "sync_attestations")]
    Attestations { attestations: Vec<Attestation> },

    #[serde(rename = "sync_done")]
    Done {
        sent: usize,
        received: usize,
        #[serde(default)]
        partial: bool,
    },
}

impl SyncMessage {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Hello { .. } => "sync_hello",
            SyncMessage::GroupHashes { .. } => "sync_group_hashes",
            SyncMessage::Need { .. } => "sync_need",
            SyncMessage::Attestations { .. } => "sync_attestations",
            SyncMessage::Done { .. } => "sync_done",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame. Anything that is not a known message is malformed.
    pub fn from_json(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| SyncError::Malformed(e.to_string()))
    }
}

pub fn encode_hash(hash: &Hash) -> String {
    hex_encode(hash)
}

pub fn decode_hash(s: &str) -> Result<Hash> {
    hex_decode(s).ok_or_else(|| SyncError::Malformed(format!("invalid hash '{}'", s)))
}

pub fn encode_groups(groups: &BTreeMap<Hash, Hash>) -> Vec<GroupHashEntry> {
    groups
        .iter()
        .map(|(gkh, gh)| GroupHashEntry {
            group_key_hash: hex_encode(gkh),
            group_hash: hex_encode(gh),
        })
        .collect()
}

/// Decode a peer's group listing. A repeated group key is malformed.
pub fn decode_groups(entries: &[GroupHashEntry]) -> Result<BTreeMap<Hash, Hash>> {
    let mut groups = BTreeMap::new();
    for entry in entries {
        let gkh = decode_hash(&entry.group_key_hash)?;
        let gh = decode_hash(&entry.group_hash)?;
        if groups.insert(gkh, gh).is_some() {
            return Err(SyncError::Malformed(format!(
                "duplicate group {}",
                entry.group_key_hash
            )));
        }
    }
    Ok(groups)
}

/// Decode a hash list into a set, rejecting bad hex.
pub fn decode_hash_set(hashes: &[String]) -> Result<BTreeSet<Hash>> {
    hashes.iter().map(|h| decode_hash(h)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qntx_sync_core::ZERO_HASH;
    use serde_json::json;

    #[test]
    fn hello_shape() {
        let msg = SyncMessage::Hello {
            root_hash: encode_hash(&ZERO_HASH),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "sync_hello", "root_hash": "0".repeat(64)})
        );
    }

    #[test]
    fn need_omits_empty_have() {
        let msg = SyncMessage::Need {
            need: vec!["ab".repeat(32)],
            have: BTreeMap::new(),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "sync_need", "need": ["ab".repeat(32)]}));
    }

    #[test]
    fn done_partial_defaults_false() {
        let msg = SyncMessage::from_json(r#"{"type":"sync_done","sent":3,"received":1}"#).unwrap();
        assert_eq!(
            msg,
            SyncMessage::Done {
                sent: 3,
                received: 1,
                partial: false
            }
        );
        assert_eq!(msg.kind(), "sync_done");
    }

    #[test]
    fn attestations_decode() {
        let frame = json!({
            "type": "sync_attestations",
            "attestations": [{
                "id": "AS-1",
                "subjects": ["ALICE"],
                "predicates": ["is"],
                "contexts": ["dev"],
                "actors": ["human:alice"],
                "timestamp": 1700000000000i64,
                "source": "cli"
            }]
        })
        .to_string();

        match SyncMessage::from_json(&frame).unwrap() {
            SyncMessage::Attestations { attestations } => {
                assert_eq!(attestations.len(), 1);
                assert_eq!(attestations[0].subjects, vec!["ALICE".to_string()]);
                assert_eq!(attestations[0].created_at, 0);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = SyncMessage::from_json(r#"{"type":"sync_bogus"}"#).unwrap_err();
        assert!(matches!(err, SyncError::Malformed(_)));

        let err = SyncMessage::from_json("{not json").unwrap_err();
        assert!(matches!(err, SyncError::Malformed(_)));
    }

    #[test]
    fn groups_roundtrip_and_duplicates() {
        let mut groups = BTreeMap::new();
        groups.insert([1u8; 32], [2u8; 32]);
        groups.insert([3u8; 32], [4u8; 32]);

        let entries = encode_groups(&groups);
        assert_eq!(decode_groups(&entries).unwrap(), groups);

        let mut dup = entries.clone();
        dup.push(entries[0].clone());
        assert!(matches!(decode_groups(&dup), Err(SyncError::Malformed(_))));
    }

    #[test]
    fn bad_hash_rejected() {
        assert!(decode_hash("xyz").is_err());
        assert!(decode_hash(&"g".repeat(64)).is_err());
        assert_eq!(decode_hash(&"AB".repeat(32)).unwrap(), [0xab; 32]);
    }
}
