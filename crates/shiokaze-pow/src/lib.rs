//! # shiokaze-pow
//!
//! Consensus-critical proof-of-work primitives for the Kaspa BlockDAG.
//!
//! This crate provides:
//! - Canonical block header serialization and the pre-PoW hash
//! - Deterministic full-rank matrix generation (xoshiro256++ + rejection)
//! - HeavyHash (cSHAKE256 + matrix transform)
//! - Compact-bits difficulty target decoding and 256-bit comparison
//! - A known-vector self check gating startup
//!
//! Everything here must reproduce the node's consensus implementation
//! byte-for-byte. A wrong digest is indistinguishable from bad luck at the
//! mining loop level, which is why [`self_check`] exists and is fatal.
//!
//! No I/O, no logging: every function is pure over its inputs.

mod error;
mod header;
mod matrix;
mod pow;
mod xoshiro;

pub use error::{PowError, PowResult};
pub use header::{blue_work_bytes, calculate_pre_pow_hash, BlockHeader, ParentLevel};
pub use matrix::{generate_matrix, heavy_hash, Matrix};
pub use pow::{bits_to_target, compute_pow, self_check, Uint256};
pub use xoshiro::Xoshiro256PlusPlus;

/// A 32-byte hash as raw bytes.
pub type Hash32 = [u8; 32];
