//! Full-rank matrix generation and the HeavyHash transform.
//!
//! The matrix is a pure function of the pre-PoW hash: a xoshiro256++
//! generator seeded from the hash draws 64x64 nibbles, and candidates are
//! rejected until one has rank 64. Rejection draws continue from the same
//! generator state; re-seeding would select different matrices and break
//! consensus. Callers cache the matrix per pre-PoW hash, since generation
//! dominates everything else in the pipeline.

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{CShake256, CShake256Core};

use crate::xoshiro::Xoshiro256PlusPlus;
use crate::Hash32;

/// 64x64 grid of 4-bit values, one row per output nibble.
pub type Matrix = [[u16; 64]; 64];

/// Rank threshold for accepting a floating-point pivot. Part of consensus:
/// changing it (or the elimination order below) changes which matrices are
/// accepted.
const EPS: f64 = 1e-9;

pub(crate) fn cshake256(custom: &[u8], data: &[u8]) -> Hash32 {
    let hasher = CShake256::from_core(CShake256Core::new(custom)).chain(data);
    let mut output = [0u8; 32];
    hasher.finalize_xof().read(&mut output);
    output
}

/// Gaussian elimination over f64, preserving the node's elimination order:
/// scan columns left to right, pick the first unselected row with a pivot
/// above EPS, normalize from column i+1, eliminate every other row.
fn compute_rank(matrix: &Matrix) -> usize {
    let mut mat = [[0.0f64; 64]; 64];
    for (dst, src) in mat.iter_mut().zip(matrix.iter()) {
        for (d, &s) in dst.iter_mut().zip(src.iter()) {
            *d = s as f64;
        }
    }

    let mut row_selected = [false; 64];
    let mut rank = 0;

    for i in 0..64 {
        let mut j = 0;
        while j < 64 {
            if !row_selected[j] && mat[j][i].abs() > EPS {
                break;
            }
            j += 1;
        }

        if j != 64 {
            rank += 1;
            row_selected[j] = true;

            let divisor = mat[j][i];
            for p in (i + 1)..64 {
                mat[j][p] /= divisor;
            }

            for k in 0..64 {
                if k != j && mat[k][i].abs() > EPS {
                    let factor = mat[k][i];
                    for p in (i + 1)..64 {
                        mat[k][p] -= mat[j][p] * factor;
                    }
                }
            }
        }
    }

    rank
}

/// Derive the full-rank matrix for a pre-PoW hash. Deterministic; rank 64
/// is guaranteed by rejection sampling.
pub fn generate_matrix(pre_pow_hash: &Hash32) -> Matrix {
    let mut rng = Xoshiro256PlusPlus::from_hash(pre_pow_hash);

    loop {
        let mut matrix = [[0u16; 64]; 64];

        for row in matrix.iter_mut() {
            for j in (0..64).step_by(16) {
                let draw = rng.next_u64();
                for k in 0..16 {
                    row[j + k] = ((draw >> (4 * k)) & 0x0f) as u16;
                }
            }
        }

        if compute_rank(&matrix) == 64 {
            return matrix;
        }
    }
}

/// Fold a 32-byte digest through the matrix: expand to 64 nibbles, take
/// integer dot products per row, keep bits 10..14 of each sum, repack and
/// XOR with the input, then finalize with cSHAKE256("HeavyHash").
pub fn heavy_hash(matrix: &Matrix, hash: &Hash32) -> Hash32 {
    let mut v = [0u16; 64];
    for i in 0..32 {
        v[i * 2] = (hash[i] >> 4) as u16;
        v[i * 2 + 1] = (hash[i] & 0x0f) as u16;
    }

    // Row sums stay far below u64 range: 64 * 15 * 15 = 14,400 max.
    let mut p = [0u64; 64];
    for (slot, row) in p.iter_mut().zip(matrix.iter()) {
        let mut sum: u64 = 0;
        for (m, x) in row.iter().zip(v.iter()) {
            sum += (*m as u64) * (*x as u64);
        }
        *slot = (sum >> 10) & 0x0f;
    }

    let mut digest = [0u8; 32];
    for i in 0..32 {
        let high = (p[i * 2] & 0x0f) as u8;
        let low = (p[i * 2 + 1] & 0x0f) as u8;
        digest[i] = hash[i] ^ ((high << 4) | low);
    }

    cshake256(b"HeavyHash", &digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    #[test]
    fn generated_matrices_always_have_full_rank() {
        let mut rng = StdRng::seed_from_u64(0x5105_0ca7e);
        let mut hash = [0u8; 32];
        for _ in 0..1_000 {
            rng.fill_bytes(&mut hash);
            let matrix = generate_matrix(&hash);
            assert_eq!(compute_rank(&matrix), 64);
        }
    }

    #[test]
    fn generation_is_pure() {
        let hash = [0xabu8; 32];
        assert_eq!(generate_matrix(&hash), generate_matrix(&hash));
    }

    #[test]
    fn singular_matrix_is_rejected_by_rank_check() {
        // Two identical rows force rank < 64.
        let mut matrix = generate_matrix(&[0x01u8; 32]);
        matrix[1] = matrix[0];
        assert!(compute_rank(&matrix) < 64);
    }

    #[test]
    fn heavy_hash_depends_on_input_digest() {
        let matrix = generate_matrix(&[0x42u8; 32]);
        let a = heavy_hash(&matrix, &[0x00u8; 32]);
        let b = heavy_hash(&matrix, &[0x01u8; 32]);
        assert_ne!(a, b);
    }
}
