//! HTTP JSON-RPC implementation of [`LedgerClient`].

use super::types::{
    JsonRpcRequest, JsonRpcResponse, NodeInfoResponse, TransactionResponse, WireAmount,
    METHOD_ADD_TX, METHOD_GET_BALANCE, METHOD_GET_INFO, METHOD_GET_NONCE, METHOD_GET_TX,
};
use super::{LedgerClient, NodeInfo, RpcError, SubmissionResult, TxStatus};
use crate::config::DEFAULT_DENOMINATION;
use async_trait::async_trait;
use loadgen_types::{Address, ShardId, SignedTransfer, TxHash};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// JSON-RPC client for a single node.
#[derive(Clone)]
pub struct JsonRpcClient {
    base_url: String,
    http: reqwest::Client,
    next_id: Arc<AtomicU64>,
    /// Base units per whole unit; balances are reported in whole units.
    denomination: u64,
}

impl JsonRpcClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            http,
            next_id: Arc::new(AtomicU64::new(1)),
            denomination: DEFAULT_DENOMINATION,
        })
    }

    /// Set base units per whole unit.
    pub fn with_denomination(mut self, denomination: u64) -> Self {
        self.denomination = denomination.max(1);
        self
    }

    /// Get the base URL of this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<Option<R>, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        trace!(endpoint = %self.base_url, method, id, "RPC call");

        let response = self
            .http
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http(format!("HTTP status {status}")));
        }

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        if body.id.is_some_and(|resp_id| resp_id != id) {
            return Err(RpcError::InvalidResponse(format!(
                "response id {:?} does not match request id {id}",
                body.id
            )));
        }

        Ok(body.result)
    }

    async fn call_required<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        self.call(method, params)
            .await?
            .ok_or_else(|| RpcError::InvalidResponse(format!("{method} returned no result")))
    }
}

fn map_http_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else {
        RpcError::Http(e.to_string())
    }
}

#[async_trait]
impl LedgerClient for JsonRpcClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn submit_transfer(&self, tx: &SignedTransfer) -> Result<SubmissionResult, RpcError> {
        match self.call::<_, bool>(METHOD_ADD_TX, [tx]).await {
            Ok(accepted) => Ok(SubmissionResult {
                accepted: accepted.unwrap_or(false),
                hash: tx.hash,
                error: None,
            }),
            // The node answered and refused the transfer.
            Err(RpcError::Remote { message, .. }) => Ok(SubmissionResult {
                accepted: false,
                hash: tx.hash,
                error: Some(message),
            }),
            Err(e) => Err(e),
        }
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, RpcError> {
        let amount: WireAmount = self.call_required(METHOD_GET_BALANCE, [address]).await?;
        let base_units = amount.to_u64().map_err(RpcError::InvalidResponse)?;
        Ok(base_units / self.denomination)
    }

    async fn get_nonce(&self, address: &Address) -> Result<u64, RpcError> {
        let nonce: WireAmount = self.call_required(METHOD_GET_NONCE, [address]).await?;
        nonce.to_u64().map_err(RpcError::InvalidResponse)
    }

    async fn get_transaction(&self, hash: &TxHash) -> Result<Option<TxStatus>, RpcError> {
        let response: Option<TransactionResponse> = self.call(METHOD_GET_TX, [hash]).await?;
        Ok(response
            .and_then(|r| r.status)
            .map(|status| TxStatus::parse(&status)))
    }

    async fn node_info(&self) -> Result<NodeInfo, RpcError> {
        let info: NodeInfoResponse = self
            .call_required(METHOD_GET_INFO, Vec::<()>::new())
            .await?;
        Ok(NodeInfo {
            shard: info.shard.map(ShardId),
            coinbase: info.coinbase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let client = JsonRpcClient::new("http://127.0.0.1:8027", Duration::from_secs(1))
            .unwrap()
            .with_denomination(0);
        assert_eq!(client.base_url(), "http://127.0.0.1:8027");
        assert_eq!(client.endpoint(), "http://127.0.0.1:8027");
        assert_eq!(client.denomination, 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        // Port 9 (discard) on localhost is not expected to speak HTTP.
        let client = JsonRpcClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let result = client.node_info().await;
        assert!(matches!(
            result,
            Err(RpcError::Http(_)) | Err(RpcError::Timeout)
        ));
    }
}
