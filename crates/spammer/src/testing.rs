//! In-memory ledger double for tests.

use crate::client::{LedgerClient, NodeInfo, RpcError, SubmissionResult, TxStatus};
use async_trait::async_trait;
use loadgen_types::{Address, ShardId, SignedTransfer, TxHash};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A single-shard node held in memory.
///
/// Clones share state, so a test can keep a handle after passing the ledger
/// to `ShardClients`.
#[derive(Clone)]
pub struct MockLedger {
    endpoint: String,
    shard: ShardId,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    balances: HashMap<Address, u64>,
    nonces: HashMap<Address, u64>,
    submitted: Vec<SignedTransfer>,
    submit_attempts: u64,
    scripts: HashMap<TxHash, VecDeque<Option<TxStatus>>>,
    status_queries: HashMap<TxHash, u64>,
    default_status: Option<TxStatus>,
    failing_submissions: u64,
    fail_submissions: bool,
    reject_submissions: bool,
    fail_queries: bool,
    fail_node_info: bool,
}

impl MockLedger {
    pub fn new(endpoint: impl Into<String>, shard: ShardId) -> Self {
        Self {
            endpoint: endpoint.into(),
            shard,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn set_balance(&self, address: Address, balance: u64) {
        self.state.lock().balances.insert(address, balance);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().nonces.insert(address, nonce);
    }

    /// Statuses returned for `hash`, one per query. The last one repeats.
    pub fn script_status(&self, hash: TxHash, statuses: Vec<Option<TxStatus>>) {
        self.state.lock().scripts.insert(hash, statuses.into());
    }

    /// Status for hashes without a script.
    pub fn set_default_status(&self, status: Option<TxStatus>) {
        self.state.lock().default_status = status;
    }

    /// Make every submission fail at the transport level.
    pub fn fail_submissions(&self, fail: bool) {
        self.state.lock().fail_submissions = fail;
    }

    /// Make the next `count` submissions fail at the transport level.
    pub fn fail_next_submissions(&self, count: u64) {
        self.state.lock().failing_submissions = count;
    }

    /// Answer submissions with `accepted: false`.
    pub fn reject_submissions(&self, reject: bool) {
        self.state.lock().reject_submissions = reject;
    }

    /// Make balance, nonce and transaction queries fail.
    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().fail_queries = fail;
    }

    pub fn fail_node_info(&self, fail: bool) {
        self.state.lock().fail_node_info = fail;
    }

    /// Transfers the node accepted, in arrival order.
    pub fn submitted(&self) -> Vec<SignedTransfer> {
        self.state.lock().submitted.clone()
    }

    /// Every submission call, including failed and rejected ones.
    pub fn submit_attempts(&self) -> u64 {
        self.state.lock().submit_attempts
    }

    /// Number of status queries seen for `hash`.
    pub fn status_queries(&self, hash: &TxHash) -> u64 {
        self.state
            .lock()
            .status_queries
            .get(hash)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit_transfer(&self, tx: &SignedTransfer) -> Result<SubmissionResult, RpcError> {
        let mut state = self.state.lock();
        state.submit_attempts += 1;

        if state.fail_submissions {
            return Err(RpcError::Http("connection refused".into()));
        }
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(RpcError::Timeout);
        }
        if state.reject_submissions {
            return Ok(SubmissionResult {
                accepted: false,
                hash: tx.hash,
                error: Some("rejected by mock".into()),
            });
        }

        state.submitted.push(tx.clone());
        Ok(SubmissionResult {
            accepted: true,
            hash: tx.hash,
            error: None,
        })
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, RpcError> {
        let state = self.state.lock();
        if state.fail_queries {
            return Err(RpcError::Timeout);
        }
        Ok(state.balances.get(address).copied().unwrap_or(0))
    }

    async fn get_nonce(&self, address: &Address) -> Result<u64, RpcError> {
        let state = self.state.lock();
        if state.fail_queries {
            return Err(RpcError::Timeout);
        }
        Ok(state.nonces.get(address).copied().unwrap_or(0))
    }

    async fn get_transaction(&self, hash: &TxHash) -> Result<Option<TxStatus>, RpcError> {
        let mut state = self.state.lock();
        *state.status_queries.entry(*hash).or_default() += 1;
        if state.fail_queries {
            return Err(RpcError::Remote {
                code: -32000,
                message: "unavailable".into(),
            });
        }

        let default = state.default_status.clone();
        match state.scripts.get_mut(hash) {
            Some(script) if script.len() > 1 => Ok(script.pop_front().flatten()),
            Some(script) => Ok(script.front().cloned().flatten()),
            None => Ok(default),
        }
    }

    async fn node_info(&self) -> Result<NodeInfo, RpcError> {
        if self.state.lock().fail_node_info {
            return Err(RpcError::Http("node unreachable".into()));
        }
        Ok(NodeInfo {
            shard: Some(self.shard),
            coinbase: None,
        })
    }
}
