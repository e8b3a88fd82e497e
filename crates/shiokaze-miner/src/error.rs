//! Miner error types.

use thiserror::Error;

/// Errors from talking to the node.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (unreachable node, timeout, bad HTTP).
    /// Always retriable; handled with backoff, never fatal.
    #[error("rpc transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with an RPC-level error object.
    #[error("node error: {0}")]
    Node(String),

    /// The node answered but the payload was not what the method returns.
    #[error("malformed rpc payload: {0}")]
    Payload(String),
}

/// Result type for node client operations.
pub type ClientResult<T> = Result<T, ClientError>;
