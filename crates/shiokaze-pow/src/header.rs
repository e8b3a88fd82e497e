//! Block header wire model and pre-PoW hashing.
//!
//! The pre-PoW hash commits to every header field except timestamp and
//! nonce, which are hashed as zero. It is therefore stable across the whole
//! nonce search for a template, and doubles as the seed for the HeavyHash
//! matrix.

use blake2::digest::consts::U32;
use blake2::digest::{FixedOutput, KeyInit, Update};
use blake2::Blake2bMac;
use serde::{Deserialize, Serialize};

use crate::error::{PowError, PowResult};
use crate::Hash32;

/// Domain key for header hashing. An unkeyed Blake2b over the same bytes
/// still yields plausible-looking digests that never satisfy any target.
const BLOCK_HASH_DOMAIN: &[u8] = b"BlockHash";

/// One level of parent references in the header's DAG structure.
/// Order is part of the hashed encoding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentLevel {
    pub parent_hashes: Vec<String>,
}

/// Block header as served by the node.
///
/// The miner holds it as an immutable snapshot; only `nonce` is set locally
/// before submission. `blue_work` stays in its hex form until hashed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub version: u16,
    #[serde(default)]
    pub parents: Vec<ParentLevel>,
    #[serde(default)]
    pub hash_merkle_root: String,
    #[serde(default)]
    pub accepted_id_merkle_root: String,
    #[serde(default)]
    pub utxo_commitment: String,
    pub timestamp: u64,
    pub bits: u32,
    #[serde(default)]
    pub nonce: u64,
    pub daa_score: u64,
    pub blue_score: u64,
    #[serde(default)]
    pub blue_work: String,
    #[serde(default)]
    pub pruning_point: String,
}

/// Decode a 64-char hex hash field. The empty string decodes to all zeros,
/// matching the node's treatment of absent hashes.
fn hash_from_hex(field: &'static str, hex_str: &str) -> PowResult<Hash32> {
    if hex_str.is_empty() {
        return Ok([0u8; 32]);
    }
    let bytes = hex::decode(hex_str).map_err(|source| PowError::InvalidHex { field, source })?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| PowError::InvalidHashLength {
            field,
            len: bytes.len(),
        })
}

/// Canonical byte form of a blueWork hex string: odd-length input gets a
/// leading pad nibble, then leading zero bytes are stripped. Both "" and
/// "0" canonicalize to the empty byte string.
pub fn blue_work_bytes(blue_work: &str) -> PowResult<Vec<u8>> {
    if blue_work.is_empty() {
        return Ok(Vec::new());
    }
    let decoded = if blue_work.len() % 2 == 1 {
        let mut padded = String::with_capacity(blue_work.len() + 1);
        padded.push('0');
        padded.push_str(blue_work);
        hex::decode(padded)
    } else {
        hex::decode(blue_work)
    }
    .map_err(|source| PowError::InvalidHex {
        field: "blueWork",
        source,
    })?;
    let start = decoded
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(decoded.len());
    Ok(decoded[start..].to_vec())
}

fn write_len(hasher: &mut impl Update, len: usize) {
    hasher.update(&(len as u64).to_le_bytes());
}

/// Hash every header field except timestamp and nonce (forced to zero) with
/// keyed Blake2b-256. Bit-exact with the node's header encoding; malformed
/// hex fails with a decode error, never retried here.
pub fn calculate_pre_pow_hash(header: &BlockHeader) -> PowResult<Hash32> {
    let mut hasher = Blake2bMac::<U32>::new_from_slice(BLOCK_HASH_DOMAIN)
        .expect("domain key is shorter than the Blake2b block size");

    hasher.update(&header.version.to_le_bytes());

    write_len(&mut hasher, header.parents.len());
    for level in &header.parents {
        write_len(&mut hasher, level.parent_hashes.len());
        for parent in &level.parent_hashes {
            hasher.update(&hash_from_hex("parentHashes", parent)?);
        }
    }

    hasher.update(&hash_from_hex("hashMerkleRoot", &header.hash_merkle_root)?);
    hasher.update(&hash_from_hex(
        "acceptedIdMerkleRoot",
        &header.accepted_id_merkle_root,
    )?);
    hasher.update(&hash_from_hex("utxoCommitment", &header.utxo_commitment)?);

    // timestamp and nonce are zeroed so the digest is nonce-search invariant
    hasher.update(&0u64.to_le_bytes());
    hasher.update(&header.bits.to_le_bytes());
    hasher.update(&0u64.to_le_bytes());

    hasher.update(&header.daa_score.to_le_bytes());
    hasher.update(&header.blue_score.to_le_bytes());

    let work = blue_work_bytes(&header.blue_work)?;
    write_len(&mut hasher, work.len());
    hasher.update(&work);

    hasher.update(&hash_from_hex("pruningPoint", &header.pruning_point)?);

    Ok(hasher.finalize_fixed().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            parents: vec![ParentLevel {
                parent_hashes: vec![
                    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
                    "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
                ],
            }],
            hash_merkle_root: "1111111111111111111111111111111111111111111111111111111111111111"
                .into(),
            accepted_id_merkle_root:
                "2222222222222222222222222222222222222222222222222222222222222222".into(),
            utxo_commitment: "3333333333333333333333333333333333333333333333333333333333333333"
                .into(),
            timestamp: 1_700_000_000_000,
            bits: 0x1e7fffff,
            nonce: 0,
            daa_score: 12_345_678,
            blue_score: 9_876_543,
            blue_work: "1234abcd".into(),
            pruning_point: "4444444444444444444444444444444444444444444444444444444444444444"
                .into(),
        }
    }

    #[test]
    fn pre_pow_hash_is_deterministic() {
        let header = test_header();
        assert_eq!(
            calculate_pre_pow_hash(&header).unwrap(),
            calculate_pre_pow_hash(&header).unwrap()
        );
    }

    #[test]
    fn pre_pow_hash_ignores_timestamp_and_nonce() {
        let header = test_header();
        let base = calculate_pre_pow_hash(&header).unwrap();

        let mut varied = header.clone();
        varied.nonce = 0xdead_beef_cafe_f00d;
        varied.timestamp = 1;
        assert_eq!(base, calculate_pre_pow_hash(&varied).unwrap());
    }

    #[test]
    fn pre_pow_hash_commits_to_daa_score() {
        let header = test_header();
        let base = calculate_pre_pow_hash(&header).unwrap();

        let mut varied = header.clone();
        varied.daa_score += 1;
        assert_ne!(base, calculate_pre_pow_hash(&varied).unwrap());
    }

    #[test]
    fn pre_pow_hash_commits_to_parent_order() {
        let header = test_header();
        let base = calculate_pre_pow_hash(&header).unwrap();

        let mut varied = header.clone();
        varied.parents[0].parent_hashes.reverse();
        assert_ne!(base, calculate_pre_pow_hash(&varied).unwrap());
    }

    #[test]
    fn malformed_hex_is_a_decode_error() {
        let mut header = test_header();
        header.hash_merkle_root = "not hex".into();
        assert!(matches!(
            calculate_pre_pow_hash(&header),
            Err(PowError::InvalidHex { .. })
        ));

        let mut short = test_header();
        short.pruning_point = "abcd".into();
        assert!(matches!(
            calculate_pre_pow_hash(&short),
            Err(PowError::InvalidHashLength { len: 2, .. })
        ));
    }

    #[test]
    fn blue_work_zero_encodes_empty() {
        assert!(blue_work_bytes("").unwrap().is_empty());
        assert!(blue_work_bytes("0").unwrap().is_empty());
        assert!(blue_work_bytes("000000").unwrap().is_empty());
    }

    #[test]
    fn blue_work_typical_value_round_trips() {
        // A realistic ~16-byte accumulated work value.
        let hex_str = "02af79b2e1f4d8c309175a6be40cd731";
        let bytes = blue_work_bytes(hex_str).unwrap();
        assert_eq!(hex::encode(&bytes), hex_str);
        assert_eq!(blue_work_bytes(&hex::encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn blue_work_odd_length_gets_pad_nibble() {
        let bytes = blue_work_bytes("aef3b").unwrap();
        assert_eq!(bytes, vec![0x0a, 0xef, 0x3b]);
        // Canonical re-encoding keeps the pad nibble; decoding is stable.
        assert_eq!(blue_work_bytes(&hex::encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn blue_work_strips_leading_zero_bytes() {
        assert_eq!(blue_work_bytes("0000ff01").unwrap(), vec![0xff, 0x01]);
        // A zero-padded value hashes identically to its stripped form.
        let mut a = test_header();
        a.blue_work = "00ff".into();
        let mut b = test_header();
        b.blue_work = "ff".into();
        assert_eq!(
            calculate_pre_pow_hash(&a).unwrap(),
            calculate_pre_pow_hash(&b).unwrap()
        );
    }
}
