//! Node RPC session: template polling, block submission, reconnects.
//!
//! All calls are blocking request/response with explicit timeouts. The
//! client never exits the process over a transport failure: the caller
//! counts failures and asks for a [`NodeClient::reconnect`], which backs
//! off, rebuilds the session, and probes the node once.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MinerConfig;
use crate::error::{ClientError, ClientResult};
use crate::rpc::{
    GetBlockTemplateRequest, GetBlockTemplateResponse, GetInfoRequest, GetInfoResponse, RpcBlock,
    RpcRequest, RpcResponse, SubmitBlockRequest, SubmitBlockResponse,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a block submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Expected during normal operation: another miner won the race or the
    /// template went stale between find and submit.
    Rejected(String),
}

/// Owns the RPC session to the node.
pub struct NodeClient {
    http: reqwest::blocking::Client,
    url: String,
    extra_data: String,
    next_id: u64,
}

impl NodeClient {
    /// Build the session and probe the node with `getInfo`.
    pub fn connect(url: String, extra_data: String) -> ClientResult<Self> {
        let mut client = Self {
            http: build_http()?,
            url,
            extra_data,
            next_id: 0,
        };
        let node = client.get_info()?;
        info!(
            server_version = %node.server_version,
            is_synced = node.is_synced,
            mempool_size = node.mempool_size,
            "connected to node"
        );
        if !node.is_synced {
            warn!("node is still syncing; templates will be skipped until it catches up");
        }
        Ok(client)
    }

    /// Close the session, back off, rebuild, and probe once. Failures are
    /// logged and left for the next poll cycle to retry.
    pub fn reconnect(&mut self) {
        warn!(url = %self.url, "rebuilding node session");
        std::thread::sleep(MinerConfig::RECONNECT_BACKOFF);
        match build_http() {
            Ok(http) => self.http = http,
            Err(e) => {
                warn!(error = %e, "failed to rebuild http client");
                return;
            }
        }
        match self.get_info() {
            Ok(node) => info!(
                server_version = %node.server_version,
                is_synced = node.is_synced,
                "reconnected to node"
            ),
            Err(e) => warn!(error = %e, "node still unreachable"),
        }
    }

    pub fn get_info(&mut self) -> ClientResult<GetInfoResponse> {
        self.call("getInfo", GetInfoRequest {})
    }

    /// Fetch a fresh template. `Ok(None)` means the node declined this
    /// cycle (an explicit error in the response); transport failures come
    /// back as `Err` for the caller's failure accounting.
    pub fn get_block_template(
        &mut self,
        pay_address: &str,
    ) -> ClientResult<Option<GetBlockTemplateResponse>> {
        let extra_data = self.extra_data.clone();
        let response: GetBlockTemplateResponse = self.call(
            "getBlockTemplate",
            GetBlockTemplateRequest {
                pay_address,
                extra_data: &extra_data,
            },
        )?;
        if let Some(node_error) = &response.error {
            warn!(message = %node_error.message, "node declined template request");
            return Ok(None);
        }
        Ok(Some(response))
    }

    /// Submit a solved block. Only a reject reason of NONE counts as
    /// accepted.
    pub fn submit_block(&mut self, block: &RpcBlock) -> ClientResult<SubmitOutcome> {
        let response: SubmitBlockResponse = self.call(
            "submitBlock",
            SubmitBlockRequest {
                block,
                allow_non_daa_blocks: false,
            },
        )?;
        Ok(submit_outcome(response))
    }

    fn call<P: Serialize, R: DeserializeOwned>(
        &mut self,
        method: &str,
        params: P,
    ) -> ClientResult<R> {
        self.next_id += 1;
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id,
            method,
            params,
        };
        debug!(method, id = self.next_id, "rpc call");
        let response: RpcResponse<R> = self
            .http
            .post(&self.url)
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;
        if let Some(rpc_error) = response.error {
            return Err(ClientError::Node(format!(
                "{} (code {})",
                rpc_error.message, rpc_error.code
            )));
        }
        response
            .result
            .ok_or_else(|| ClientError::Payload(format!("{method}: response carried no result")))
    }
}

fn build_http() -> ClientResult<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

fn submit_outcome(response: SubmitBlockResponse) -> SubmitOutcome {
    if let Some(node_error) = response.error {
        return SubmitOutcome::Rejected(node_error.message);
    }
    match response.reject_reason.as_deref() {
        None | Some("") | Some("NONE") => SubmitOutcome::Accepted,
        Some(reason) => SubmitOutcome::Rejected(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcNodeError;

    #[test]
    fn reject_reason_none_is_accepted() {
        let accepted = SubmitBlockResponse {
            reject_reason: Some("NONE".into()),
            error: None,
        };
        assert_eq!(submit_outcome(accepted), SubmitOutcome::Accepted);

        let absent = SubmitBlockResponse {
            reject_reason: None,
            error: None,
        };
        assert_eq!(submit_outcome(absent), SubmitOutcome::Accepted);
    }

    #[test]
    fn any_other_reason_is_rejected() {
        let stale = SubmitBlockResponse {
            reject_reason: Some("BLOCK_INVALID".into()),
            error: None,
        };
        assert_eq!(
            submit_outcome(stale),
            SubmitOutcome::Rejected("BLOCK_INVALID".into())
        );

        let errored = SubmitBlockResponse {
            reject_reason: None,
            error: Some(RpcNodeError {
                message: "block is stale".into(),
            }),
        };
        assert_eq!(
            submit_outcome(errored),
            SubmitOutcome::Rejected("block is stale".into())
        );
    }
}
