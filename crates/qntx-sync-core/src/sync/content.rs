//! Content addressing for attestations.
//!
//! Two nodes that record the same claim independently must arrive at the
//! same digest, so only the semantic fields are hashed and multi-valued
//! fields are sorted first. `id`, `attributes` and `created_at` never
//! contribute.
//!
//! Byte layout fed to SHA-256:
//!
//! ```text
//! "s:"    subjects   (sorted, \0-joined)
//! "\np:"  predicates (sorted, \0-joined)
//! "\nc:"  contexts   (sorted, \0-joined)
//! "\na:"  actors     (sorted, \0-joined)
//! "\nt:"  timestamp  (i64, big-endian)
//! "\nrc:" source
//! ```

use sha2::{Digest, Sha256};

use super::Hash;
use crate::Attestation;

/// Digest of an attestation's semantic fields. Never fails; empty fields
/// hash like any other value.
pub fn content_hash(attestation: &Attestation) -> Hash {
    let mut h = Sha256::new();

    let sets: [(&[u8], &[String]); 4] = [
        (b"s:", &attestation.subjects),
        (b"\np:", &attestation.predicates),
        (b"\nc:", &attestation.contexts),
        (b"\na:", &attestation.actors),
    ];
    for (tag, values) in sets {
        h.update(tag);
        write_sorted(&mut h, values);
    }

    h.update(b"\nt:");
    h.update(attestation.timestamp.to_be_bytes());
    h.update(b"\nrc:");
    h.update(attestation.source.as_bytes());

    h.finalize().into()
}

pub fn content_hash_hex(attestation: &Attestation) -> String {
    hex_encode(&content_hash(attestation))
}

/// String-in, string-out form for hosts across the WASM boundary.
///
/// Output: `{"hash":"<64-char hex>"}` or `{"error":"..."}`
pub fn content_hash_json(input: &str) -> String {
    let reply = match serde_json::from_str::<Attestation>(input) {
        Ok(att) => serde_json::json!({ "hash": content_hash_hex(&att) }),
        Err(e) => serde_json::json!({ "error": format!("invalid attestation JSON: {}", e) }),
    };
    reply.to_string()
}

// Values never contain \0, so the join is unambiguous.
fn write_sorted(h: &mut Sha256, values: &[String]) {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    for (i, value) in sorted.iter().enumerate() {
        if i > 0 {
            h.update([0u8]);
        }
        h.update(value.as_bytes());
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Lowercase hex rendering of a digest (64 chars).
pub fn hex_encode(bytes: &Hash) -> String {
    bytes
        .iter()
        .flat_map(|b| [HEX_DIGITS[(b >> 4) as usize], HEX_DIGITS[(b & 0x0f) as usize]])
        .map(char::from)
        .collect()
}

/// Parse a 64-char hex digest in either case.
pub fn hex_decode(s: &str) -> Option<Hash> {
    let bytes = s.as_bytes();
    if bytes.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (slot, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *slot = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Some(out)
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}
