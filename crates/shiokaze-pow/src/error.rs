//! Error types for proof-of-work primitives.

use thiserror::Error;

/// Errors raised while decoding node-supplied header material or by the
/// startup self check.
#[derive(Error, Debug)]
pub enum PowError {
    /// A hex-encoded header field failed to decode.
    #[error("invalid hex in {field}: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    /// A hash field decoded to something other than 32 bytes.
    #[error("{field} must be 32 bytes, got {len}")]
    InvalidHashLength { field: &'static str, len: usize },

    /// The known-vector self check produced the wrong digest.
    #[error("self check digest mismatch: expected {expected}, got {actual}")]
    SelfCheckMismatch { expected: String, actual: String },
}

/// Result type for proof-of-work operations.
pub type PowResult<T> = Result<T, PowError>;
