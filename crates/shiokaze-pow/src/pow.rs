//! Candidate hash computation and difficulty target comparison.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{PowError, PowResult};
use crate::matrix::{cshake256, generate_matrix, heavy_hash, Matrix};
use crate::Hash32;

/// 256-bit unsigned integer as four little-endian u64 limbs (limb 0 least
/// significant). Candidate digests and targets compare in this form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uint256(pub [u64; 4]);

impl Uint256 {
    pub const ZERO: Self = Self([0; 4]);
    pub const MAX: Self = Self([u64::MAX; 4]);

    /// Interpret a 32-byte digest as a little-endian integer.
    pub fn from_le_bytes(bytes: &Hash32) -> Self {
        let mut limbs = [0u64; 4];
        for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            *limb = u64::from_le_bytes(word);
        }
        Self(limbs)
    }
}

impl Ord for Uint256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Uint256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Uint256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}{:016x}{:016x}{:016x}",
            self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

/// Decode compact difficulty bits: exponent in the top byte, 24-bit
/// mantissa below. A mantissa shifted past 256 bits saturates to MAX
/// (every digest passes); node-supplied bits never reach that range.
pub fn bits_to_target(bits: u32) -> Uint256 {
    let exponent = bits >> 24;
    let mantissa = (bits & 0x00ff_ffff) as u64;

    if exponent <= 3 {
        return Uint256([mantissa >> (8 * (3 - exponent)), 0, 0, 0]);
    }
    if mantissa == 0 {
        return Uint256::ZERO;
    }

    let shift = 8 * (exponent - 3) as u64;
    let significant_bits = 64 - u64::from(mantissa.leading_zeros());
    if shift + significant_bits > 256 {
        return Uint256::MAX;
    }

    let limb = (shift / 64) as usize;
    let offset = shift % 64;
    let mut limbs = [0u64; 4];
    limbs[limb] = mantissa << offset;
    if offset > 0 && limb + 1 < 4 {
        limbs[limb + 1] = mantissa >> (64 - offset);
    }
    Uint256(limbs)
}

/// Candidate hash for one (timestamp, nonce) attempt.
///
/// Preimage layout: pre-PoW hash, timestamp LE, 32 zero bytes, nonce LE.
/// cSHAKE256("ProofOfWorkHash") compresses it, then the matrix transform
/// and cSHAKE256("HeavyHash") finish the digest. Pure over its inputs.
pub fn compute_pow(matrix: &Matrix, pre_pow_hash: &Hash32, timestamp: u64, nonce: u64) -> Hash32 {
    let mut preimage = [0u8; 80];
    preimage[0..32].copy_from_slice(pre_pow_hash);
    preimage[32..40].copy_from_slice(&timestamp.to_le_bytes());
    preimage[72..80].copy_from_slice(&nonce.to_le_bytes());

    let inner = cshake256(b"ProofOfWorkHash", &preimage);
    heavy_hash(matrix, &inner)
}

// Known-good vector from the node's consensus implementation. The whole
// pipeline (seeding, rejection sampling, rank check, both cSHAKE passes)
// must reproduce it exactly.
const CHECK_PRE_POW_HASH: Hash32 = [
    0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd,
    0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
    0xcd, 0xef,
];
const CHECK_TIMESTAMP: u64 = 1_234_567_890;
const CHECK_NONCE: u64 = 99_999;
const CHECK_DIGEST: &str = "d2154c1435c99a4ea58ca81dc35829ebd1513b67b0bdec12ba15fb27fefadc82";

/// Run the full hash pipeline against the fixed vector.
///
/// A mismatch means the implementation drifted from consensus. Mining with
/// a wrong digest burns all compute while looking exactly like bad luck,
/// so callers treat failure as fatal at startup.
pub fn self_check() -> PowResult<()> {
    let matrix = generate_matrix(&CHECK_PRE_POW_HASH);
    let digest = compute_pow(&matrix, &CHECK_PRE_POW_HASH, CHECK_TIMESTAMP, CHECK_NONCE);
    let actual = hex::encode(digest);
    if actual == CHECK_DIGEST {
        Ok(())
    } else {
        Err(PowError::SelfCheckMismatch {
            expected: CHECK_DIGEST.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector_reproduces_exact_digest() {
        let matrix = generate_matrix(&CHECK_PRE_POW_HASH);
        let digest = compute_pow(&matrix, &CHECK_PRE_POW_HASH, CHECK_TIMESTAMP, CHECK_NONCE);
        assert_eq!(hex::encode(digest), CHECK_DIGEST);
        assert!(self_check().is_ok());
    }

    #[test]
    fn compute_pow_is_pure() {
        let matrix = generate_matrix(&CHECK_PRE_POW_HASH);
        let a = compute_pow(&matrix, &CHECK_PRE_POW_HASH, 42, 7);
        let b = compute_pow(&matrix, &CHECK_PRE_POW_HASH, 42, 7);
        assert_eq!(a, b);
        assert_ne!(a, compute_pow(&matrix, &CHECK_PRE_POW_HASH, 42, 8));
    }

    #[test]
    fn bits_to_target_reference_values() {
        // Mantissa shifted fully out.
        assert_eq!(bits_to_target(0x0100_3456), Uint256([0x00, 0, 0, 0]));
        // One mantissa byte survives.
        assert_eq!(bits_to_target(0x0112_3456), Uint256([0x12, 0, 0, 0]));
        assert_eq!(bits_to_target(0x0200_8000), Uint256([0x80, 0, 0, 0]));
        // Exponent 3 is the identity point.
        assert_eq!(bits_to_target(0x0312_3456), Uint256([0x0012_3456, 0, 0, 0]));
        // Left shifts.
        assert_eq!(bits_to_target(0x0412_3456), Uint256([0x12_3456_00, 0, 0, 0]));
        assert_eq!(
            bits_to_target(0x0500_9234),
            Uint256([0x92_3400_00, 0, 0, 0])
        );
        // Difficulty-1 target: 0x7fffff << 232.
        assert_eq!(
            bits_to_target(0x207f_ffff),
            Uint256([0, 0, 0, 0x7fff_ff00_0000_0000])
        );
    }

    #[test]
    fn bits_to_target_spans_limb_boundaries() {
        // 0xffffff << 56 straddles limbs 0 and 1.
        assert_eq!(
            bits_to_target(0x0aff_ffff),
            Uint256([0xff00_0000_0000_0000, 0x00ff_ff, 0, 0])
        );
    }

    #[test]
    fn bits_to_target_saturates_past_256_bits() {
        assert_eq!(bits_to_target(0xffff_ffff), Uint256::MAX);
    }

    #[test]
    fn digest_comparison_is_little_endian() {
        let mut low = [0u8; 32];
        low[0] = 0xff;
        let mut high = [0u8; 32];
        high[31] = 0x01;
        assert!(Uint256::from_le_bytes(&low) < Uint256::from_le_bytes(&high));

        let target = bits_to_target(0x207f_ffff);
        assert!(Uint256::from_le_bytes(&low) < target);
        assert!(Uint256::from_le_bytes(&[0xffu8; 32]) > target);
    }
}
