//! Startup: load the key file and seed the Account Pool from network state.
//!
//! Every failure here is fatal. The harness never starts on a pool it only
//! partially understood.

use crate::accounts::{Account, AccountPool};
use crate::client::{ClientError, LedgerClient, RpcError, ShardClients};
use loadgen_types::{Address, KeyError, KeyPair};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to read key file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed key on line {line}: {source}")]
    MalformedKey {
        line: usize,
        #[source]
        source: KeyError,
    },

    #[error("Failed to fetch {what} for {address}: {source}")]
    Rpc {
        what: &'static str,
        address: Address,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Read a newline-separated list of hex-encoded private keys.
pub fn load_keys(path: &Path) -> Result<Vec<KeyPair>, BootstrapError> {
    let contents = std::fs::read_to_string(path).map_err(|source| BootstrapError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let keys = parse_keys(&contents)?;
    info!(path = %path.display(), keys = keys.len(), "Loaded key file");
    Ok(keys)
}

/// Parse key-file contents. Blank lines are skipped.
pub fn parse_keys(contents: &str) -> Result<Vec<KeyPair>, BootstrapError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            KeyPair::from_hex(line.trim())
                .map_err(|source| BootstrapError::MalformedKey {
                    line: idx + 1,
                    source,
                })
        })
        .collect()
}

/// Fetch balance and nonce for every key and build the initial pool.
///
/// Keys on shards without a client are skipped. Zero-balance accounts are
/// left out, and their nonce is never fetched.
pub async fn seed_accounts<C: LedgerClient>(
    keys: Vec<KeyPair>,
    clients: &ShardClients<C>,
    num_shards: u64,
) -> Result<AccountPool, BootstrapError> {
    let total = keys.len();
    let mut accounts = Vec::with_capacity(total);
    let mut skipped = 0usize;
    let mut empty = 0usize;

    for keypair in keys {
        let address = keypair.address();
        let shard = address.shard(num_shards);
        if !clients.serves(shard) {
            debug!(%address, %shard, "No client for shard, skipping key");
            skipped += 1;
            continue;
        }
        let client = clients.client_for(shard)?;

        let balance = client
            .get_balance(&address)
            .await
            .map_err(|source| BootstrapError::Rpc {
                what: "balance",
                address,
                source,
            })?;
        info!(%address, %shard, balance, "Account balance");

        if balance == 0 {
            empty += 1;
            continue;
        }

        let nonce = client
            .get_nonce(&address)
            .await
            .map_err(|source| BootstrapError::Rpc {
                what: "nonce",
                address,
                source,
            })?;
        accounts.push(Account::funded(keypair, num_shards, balance, nonce));
    }

    let pool = AccountPool::from_accounts(accounts);
    info!(
        keys = total,
        funded = pool.len(),
        skipped,
        empty,
        total_balance = pool.total_balance(),
        "Seeded account pool"
    );
    Ok(pool)
}
