//! RPC access to the ledger network.
//!
//! The harness only depends on the [`LedgerClient`] trait. [`JsonRpcClient`]
//! is the HTTP JSON-RPC implementation used by the binary; tests use the
//! in-memory double from `crate::testing`.
//!
//! Every endpoint serves exactly one shard. [`ShardClients`] resolves that
//! assignment once at startup and routes by shard afterwards.

mod json_rpc;
pub mod types;

pub use json_rpc::JsonRpcClient;

use async_trait::async_trait;
use loadgen_types::{Address, ShardId, SignedTransfer, TxHash};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a transfer submission that reached the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    /// Whether the node accepted the transfer into its pool.
    pub accepted: bool,
    /// Transaction reference to track.
    pub hash: TxHash,
    /// Rejection reason, if any.
    pub error: Option<String>,
}

/// Status reported by a node for a transaction it knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Included in a block.
    Block,
    /// Waiting in the node's transaction pool.
    Pool,
    /// Any other status string the node reports.
    Other(String),
}

impl TxStatus {
    /// Parse the node's status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "block" => Self::Block,
            "pool" => Self::Pool,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, Self::Block)
    }
}

/// Node identity as reported by the node itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Shard reported directly, if the node exposes it.
    pub shard: Option<ShardId>,
    /// The node's coinbase address.
    pub coinbase: Option<Address>,
}

impl NodeInfo {
    /// The shard this node serves: the reported shard, else the coinbase's shard.
    pub fn resolve_shard(&self, num_shards: u64) -> Option<ShardId> {
        self.shard
            .or_else(|| self.coinbase.map(|addr| addr.shard(num_shards)))
    }
}

/// Ledger RPC operations consumed by the harness.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Human-readable endpoint identifier for logs.
    fn endpoint(&self) -> &str;

    /// Submit a signed transfer.
    async fn submit_transfer(&self, tx: &SignedTransfer) -> Result<SubmissionResult, RpcError>;

    /// Spendable balance of `address` in whole units.
    async fn get_balance(&self, address: &Address) -> Result<u64, RpcError>;

    /// Number of transfers already sent from `address`.
    async fn get_nonce(&self, address: &Address) -> Result<u64, RpcError>;

    /// Status of a transaction, or `None` if the node does not know it.
    async fn get_transaction(&self, hash: &TxHash) -> Result<Option<TxStatus>, RpcError>;

    /// Identity of the node behind this client.
    async fn node_info(&self) -> Result<NodeInfo, RpcError>;
}

/// Errors returned by RPC calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out")]
    Timeout,

    #[error("RPC error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors from building or querying the shard routing table.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("No RPC clients configured")]
    NoClients,

    #[error("Failed to fetch node info from {endpoint}: {source}")]
    NodeInfo {
        endpoint: String,
        #[source]
        source: RpcError,
    },

    #[error("Node {endpoint} did not report a shard or coinbase")]
    UnresolvedShard { endpoint: String },

    #[error("Node {endpoint} reports shard {shard}, outside the {num_shards} configured shards")]
    ShardOutOfRange {
        endpoint: String,
        shard: ShardId,
        num_shards: u64,
    },

    #[error("No client configured for shard {0}")]
    NoClientForShard(ShardId),
}

/// Shard-to-client routing table.
pub struct ShardClients<C> {
    by_shard: BTreeMap<ShardId, Arc<C>>,
}

impl<C> Clone for ShardClients<C> {
    fn clone(&self) -> Self {
        Self {
            by_shard: self.by_shard.clone(),
        }
    }
}

impl<C> Default for ShardClients<C> {
    fn default() -> Self {
        Self {
            by_shard: BTreeMap::new(),
        }
    }
}

impl<C: LedgerClient> ShardClients<C> {
    /// Create an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` for `shard`. Returns false (and keeps the existing
    /// client) if the shard is already served.
    pub fn insert(&mut self, shard: ShardId, client: C) -> bool {
        if let Some(existing) = self.by_shard.get(&shard) {
            warn!(
                %shard,
                kept = existing.endpoint(),
                ignored = client.endpoint(),
                "Multiple endpoints for one shard, keeping the first"
            );
            return false;
        }
        self.by_shard.insert(shard, Arc::new(client));
        true
    }

    /// Ask every client which shard it serves and build the routing table.
    ///
    /// Any node that cannot be identified is a startup error. An empty
    /// client list is rejected as well.
    pub async fn discover(clients: Vec<C>, num_shards: u64) -> Result<Self, ClientError> {
        let mut table = Self::new();

        for client in clients {
            let info = client
                .node_info()
                .await
                .map_err(|source| ClientError::NodeInfo {
                    endpoint: client.endpoint().to_string(),
                    source,
                })?;

            let shard = info
                .resolve_shard(num_shards)
                .ok_or_else(|| ClientError::UnresolvedShard {
                    endpoint: client.endpoint().to_string(),
                })?;

            if shard.0 >= num_shards {
                return Err(ClientError::ShardOutOfRange {
                    endpoint: client.endpoint().to_string(),
                    shard,
                    num_shards,
                });
            }

            info!(endpoint = client.endpoint(), %shard, "Resolved endpoint shard");
            table.insert(shard, client);
        }

        table.validate()?;
        Ok(table)
    }

    /// Reject an empty routing table.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.by_shard.is_empty() {
            return Err(ClientError::NoClients);
        }
        Ok(())
    }

    /// The client serving `shard`.
    pub fn client_for(&self, shard: ShardId) -> Result<&C, ClientError> {
        self.by_shard
            .get(&shard)
            .map(|c| c.as_ref())
            .ok_or(ClientError::NoClientForShard(shard))
    }

    pub fn serves(&self, shard: ShardId) -> bool {
        self.by_shard.contains_key(&shard)
    }

    /// Shards with a configured client, ascending.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.by_shard.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_shard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_shard.is_empty()
    }
}
