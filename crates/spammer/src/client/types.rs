//! Wire types for JSON-RPC communication.

use loadgen_types::Address;
use serde::{Deserialize, Serialize};

/// Submit a signed transfer.
pub const METHOD_ADD_TX: &str = "seele.AddTx";
/// Fetch an account balance in base units.
pub const METHOD_GET_BALANCE: &str = "seele.GetBalance";
/// Fetch an account nonce.
pub const METHOD_GET_NONCE: &str = "seele.GetAccountNonce";
/// Fetch a transaction by hash from the node's pool or chain.
pub const METHOD_GET_TX: &str = "txpool.GetTransactionByHash";
/// Fetch node identity.
pub const METHOD_GET_INFO: &str = "seele.GetInfo";

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P> JsonRpcRequest<'a, P> {
    pub fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<R> {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

/// Error object carried in a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Amount as returned by a node: either a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireAmount {
    Number(u64),
    Text(String),
}

impl WireAmount {
    pub fn to_u64(&self) -> Result<u64, String> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| format!("not an unsigned integer: {s:?}")),
        }
    }
}

/// Response from the transaction lookup method.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResponse {
    /// "block" when included, "pool" when still pending.
    #[serde(default)]
    pub status: Option<String>,
}

/// Response from the node info method.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfoResponse {
    #[serde(default, alias = "Coinbase")]
    pub coinbase: Option<Address>,
    #[serde(default, alias = "Shard")]
    pub shard: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope() {
        let req = JsonRpcRequest::new(7, METHOD_GET_NONCE, ["0xabc"]);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "seele.GetAccountNonce");
        assert_eq!(value["params"][0], "0xabc");
    }

    #[test]
    fn test_method_namespaces() {
        for method in [
            METHOD_ADD_TX,
            METHOD_GET_BALANCE,
            METHOD_GET_NONCE,
            METHOD_GET_INFO,
        ] {
            assert!(method.starts_with("seele."), "{method}");
        }
        assert_eq!(METHOD_GET_TX, "txpool.GetTransactionByHash");
    }

    #[test]
    fn test_error_response() {
        let resp: JsonRpcResponse<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().message, "nonce too low");
    }

    #[test]
    fn test_wire_amount_accepts_number_and_string() {
        let n: WireAmount = serde_json::from_str("1500").unwrap();
        let s: WireAmount = serde_json::from_str("\"1500\"").unwrap();
        assert_eq!(n.to_u64().unwrap(), 1500);
        assert_eq!(s.to_u64().unwrap(), 1500);
        let bad: WireAmount = serde_json::from_str("\"-3\"").unwrap();
        assert!(bad.to_u64().is_err());
    }

    #[test]
    fn test_node_info_aliases() {
        let info: NodeInfoResponse = serde_json::from_str(r#"{"Shard":2}"#).unwrap();
        assert_eq!(info.shard, Some(2));
        assert!(info.coinbase.is_none());
    }
}
