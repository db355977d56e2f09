//! Tamper-evidence primitives: hash chains and Merkle trees.
//!
//! Everything here is a pure function over byte buffers and strings so it can
//! be reused by the file-backed audit logger, the manifest, and offline
//! verifiers alike.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel "previous hash" for the first entry of every chain.
pub const GENESIS: &str = "GENESIS";

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash linking one chain entry to its predecessor:
/// `SHA256(previous_hash ":" canonical_payload)`.
pub fn chain_hash(previous_hash: &str, canonical_payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_payload.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Chain lines
// =============================================================================

/// One parsed `timestamp|hash|payload` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLine<'a> {
    pub timestamp: &'a str,
    pub hash: &'a str,
    pub payload: &'a str,
}

/// Render a record in the on-disk line format (without trailing newline).
pub fn format_chain_line(timestamp: &str, hash: &str, canonical_payload: &str) -> String {
    format!("{}|{}|{}", timestamp, hash, canonical_payload)
}

/// Split a stored line into its three fields.
///
/// The payload is canonical JSON and may itself contain `|`, so only the
/// first two separators are significant.
pub fn parse_chain_line(line: &str) -> Option<ChainLine<'_>> {
    let mut parts = line.splitn(3, '|');
    let timestamp = parts.next()?;
    let hash = parts.next()?;
    let payload = parts.next()?;
    if timestamp.is_empty() || !is_sha256_hex(hash) || payload.is_empty() {
        return None;
    }
    Some(ChainLine {
        timestamp,
        hash,
        payload,
    })
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A single problem found while replaying a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainError {
    /// 1-based line number (0 when the problem is not tied to a line).
    pub line: usize,
    pub message: String,
}

/// Outcome of replaying a chain from GENESIS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub entries: usize,
    pub last_hash: String,
    pub errors: Vec<ChainError>,
}

/// Replay a whole chain text and recompute every link.
///
/// After a mismatch the replay continues from the stored hash, so a single
/// altered record yields one error instead of cascading through every later
/// line.
pub fn verify_chain_text(text: &str) -> ChainVerification {
    let mut previous = GENESIS.to_string();
    let mut errors = Vec::new();
    let mut entries = 0;

    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();

    for (idx, raw) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        if raw.is_empty() {
            // Only the terminator after the final record may be empty.
            if idx + 1 < total {
                errors.push(ChainError {
                    line: line_no,
                    message: "empty line inside chain".into(),
                });
            }
            continue;
        }

        let Some(parsed) = parse_chain_line(raw) else {
            errors.push(ChainError {
                line: line_no,
                message: "malformed record".into(),
            });
            continue;
        };
        entries += 1;

        if serde_json::from_str::<serde_json::Value>(parsed.payload).is_err() {
            errors.push(ChainError {
                line: line_no,
                message: "payload is not valid JSON".into(),
            });
        }

        let expected = chain_hash(&previous, parsed.payload);
        if expected != parsed.hash {
            errors.push(ChainError {
                line: line_no,
                message: format!(
                    "hash mismatch: expected {}, stored {}",
                    &expected[..16],
                    &parsed.hash[..16]
                ),
            });
        }
        previous = parsed.hash.to_string();
    }

    ChainVerification {
        valid: errors.is_empty(),
        entries,
        last_hash: previous,
        errors,
    }
}

// =============================================================================
// Merkle tree
// =============================================================================

/// Leaf digest of one record.
pub fn leaf_hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            // Odd node out is paired with itself.
            [last] => node_hash(last, last),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Merkle root over ordered leaf digests.
///
/// The root of an empty set is the digest of the empty string; the root of a
/// single leaf is the leaf itself.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return leaf_hash(b"");
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Hex-encoded Merkle root.
pub fn merkle_root_hex(leaves: &[[u8; 32]]) -> String {
    hex::encode(merkle_root(leaves))
}

/// Which side the sibling sits on when recombining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Inclusion proof for the leaf at `index`, or `None` if out of range.
pub fn merkle_proof(leaves: &[[u8; 32]], index: usize) -> Option<Vec<ProofStep>> {
    if index >= leaves.len() {
        return None;
    }
    let mut proof = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;
    while level.len() > 1 {
        let (sibling, side) = if idx % 2 == 0 {
            // Right sibling, or self when this is the odd node out.
            (level.get(idx + 1).unwrap_or(&level[idx]), Side::Right)
        } else {
            (&level[idx - 1], Side::Left)
        };
        proof.push(ProofStep {
            sibling: hex::encode(sibling),
            side,
        });
        level = next_level(&level);
        idx /= 2;
    }
    Some(proof)
}

/// Check that `leaf` combined along `proof` reproduces `root_hex`.
pub fn verify_merkle_proof(leaf: [u8; 32], proof: &[ProofStep], root_hex: &str) -> bool {
    let mut acc = leaf;
    for step in proof {
        let Ok(bytes) = hex::decode(&step.sibling) else {
            return false;
        };
        let Ok(sibling) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            return false;
        };
        acc = match step.side {
            Side::Left => node_hash(&sibling, &acc),
            Side::Right => node_hash(&acc, &sibling),
        };
    }
    hex::encode(acc) == root_hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_chain(payloads: &[&str]) -> String {
        let mut previous = GENESIS.to_string();
        let mut out = String::new();
        for (i, p) in payloads.iter().enumerate() {
            let h = chain_hash(&previous, p);
            out.push_str(&format_chain_line(&format!("2026-01-01T00:00:0{}Z", i), &h, p));
            out.push('\n');
            previous = h;
        }
        out
    }

    #[test]
    fn test_chain_hash_depends_on_previous() {
        let a = chain_hash(GENESIS, r#"{"a":1}"#);
        let b = chain_hash(&a, r#"{"a":1}"#);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_verify_clean_chain() {
        let text = build_chain(&[r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":"a|b"}"#]);
        let v = verify_chain_text(&text);
        assert!(v.valid, "{:?}", v.errors);
        assert_eq!(v.entries, 3);
    }

    #[test]
    fn test_verify_detects_altered_payload() {
        let text = build_chain(&[r#"{"n":1}"#, r#"{"n":2}"#, r#"{"n":3}"#]);
        let tampered = text.replacen(r#"{"n":2}"#, r#"{"n":7}"#, 1);
        let v = verify_chain_text(&tampered);
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 1);
        assert_eq!(v.errors[0].line, 2);
    }

    #[test]
    fn test_verify_detects_reorder() {
        let text = build_chain(&[r#"{"n":1}"#, r#"{"n":2}"#]);
        let mut lines: Vec<&str> = text.lines().collect();
        lines.swap(0, 1);
        let v = verify_chain_text(&(lines.join("\n") + "\n"));
        assert!(!v.valid);
    }

    #[test]
    fn test_verify_reports_malformed_line() {
        let mut text = build_chain(&[r#"{"n":1}"#]);
        text.push_str("garbage\n");
        let v = verify_chain_text(&text);
        assert!(!v.valid);
        assert_eq!(v.errors[0].line, 2);
        assert_eq!(v.errors[0].message, "malformed record");
    }

    #[test]
    fn test_merkle_root_single_and_empty() {
        let leaf = leaf_hash(b"x");
        assert_eq!(merkle_root(&[leaf]), leaf);
        assert_eq!(merkle_root(&[]), leaf_hash(b""));
    }

    #[test]
    fn test_merkle_root_sensitive_to_order_and_membership() {
        let leaves: Vec<[u8; 32]> = ["a", "b", "c"].iter().map(|s| leaf_hash(s.as_bytes())).collect();
        let root = merkle_root_hex(&leaves);
        assert_eq!(root, merkle_root_hex(&leaves));

        let reordered = vec![leaves[1], leaves[0], leaves[2]];
        assert_ne!(root, merkle_root_hex(&reordered));
        assert_ne!(root, merkle_root_hex(&leaves[..2]));

        let mut extended = leaves.clone();
        extended.push(leaf_hash(b"d"));
        assert_ne!(root, merkle_root_hex(&extended));
    }

    #[test]
    fn test_merkle_proofs_verify_for_every_leaf() {
        let leaves: Vec<[u8; 32]> = (0..5).map(|i| leaf_hash(format!("e{}", i).as_bytes())).collect();
        let root = merkle_root_hex(&leaves);
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = merkle_proof(&leaves, i).unwrap();
            assert!(verify_merkle_proof(*leaf, &proof, &root), "leaf {}", i);
        }
        assert!(merkle_proof(&leaves, 5).is_none());

        let proof = merkle_proof(&leaves, 0).unwrap();
        assert!(!verify_merkle_proof(leaf_hash(b"forged"), &proof, &root));
    }
}
