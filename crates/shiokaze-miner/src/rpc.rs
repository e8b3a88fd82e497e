//! Wire types for the node's JSON-RPC interface.
//!
//! Field names follow the node's camelCase schema. Transactions are
//! carried opaquely: the miner never inspects them, it only echoes them
//! back on submission.

use serde::{Deserialize, Serialize};
use shiokaze_pow::BlockHeader;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<R> {
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// Transport-level error object in a JSON-RPC response.
#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Application-level error the node embeds inside method results.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcNodeError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBlockTemplateRequest<'a> {
    pub pay_address: &'a str,
    pub extra_data: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBlockTemplateResponse {
    pub block: RpcBlock,
    #[serde(default)]
    pub is_synced: bool,
    #[serde(default)]
    pub error: Option<RpcNodeError>,
}

/// A block as served in a template and echoed back on submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub header: BlockHeader,
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBlockRequest<'a> {
    pub block: &'a RpcBlock,
    pub allow_non_daa_blocks: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBlockResponse {
    /// "NONE" (or absent) means accepted; anything else names the reason.
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub error: Option<RpcNodeError>,
}

#[derive(Debug, Serialize)]
pub struct GetInfoRequest {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetInfoResponse {
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub is_synced: bool,
    #[serde(default)]
    pub mempool_size: u64,
}
