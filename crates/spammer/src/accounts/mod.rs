//! Account management for transaction generation.
//!
//! Provides the `Account` type and the shared `AccountPool`. Accounts enter the
//! pool either at bootstrap (pre-funded keys) or after a transfer that created
//! them has been confirmed.

use loadgen_types::{Address, KeyPair, ShardId, TxHash};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A funded test account.
///
/// Balance and nonce are atomics so the pool can hand out shared handles:
/// only the Sender Loop writes them, other readers (progress reports, tests)
/// only load.
pub struct Account {
    /// The keypair authorizing transfers from `address`.
    pub keypair: KeyPair,

    /// Public identifier derived from the keypair.
    pub address: Address,

    /// The shard this account belongs to.
    pub shard: ShardId,

    /// Spendable amount in whole units.
    balance: AtomicU64,

    /// Number of transfers already sent from this account.
    nonce: AtomicU64,

    /// Transfer that funded this account, until it is confirmed.
    pending_tx: Option<TxHash>,

    /// Informational only: set once the funding transfer was observed in a block.
    packed: bool,
}

impl Clone for Account {
    fn clone(&self) -> Self {
        Self {
            keypair: self.keypair.clone(),
            address: self.address,
            shard: self.shard,
            balance: AtomicU64::new(self.balance()),
            nonce: AtomicU64::new(self.nonce()),
            pending_tx: self.pending_tx,
            packed: self.packed,
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("shard", &self.shard)
            .field("balance", &self.balance())
            .field("nonce", &self.nonce())
            .field("pending_tx", &self.pending_tx)
            .field("packed", &self.packed)
            .finish()
    }
}

impl Account {
    /// An account loaded from a key with state fetched from the network.
    pub fn funded(keypair: KeyPair, num_shards: u64, balance: u64, nonce: u64) -> Self {
        let address = keypair.address();
        Self {
            shard: address.shard(num_shards),
            address,
            keypair,
            balance: AtomicU64::new(balance),
            nonce: AtomicU64::new(nonce),
            pending_tx: None,
            packed: false,
        }
    }

    /// A freshly created recipient of `amount`, funded by `funding_tx`.
    pub fn recipient(keypair: KeyPair, shard: ShardId, amount: u64, funding_tx: TxHash) -> Self {
        Self {
            address: keypair.address(),
            keypair,
            shard,
            balance: AtomicU64::new(amount),
            nonce: AtomicU64::new(0),
            pending_tx: Some(funding_tx),
            packed: false,
        }
    }

    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::SeqCst)
    }

    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    pub fn pending_tx(&self) -> Option<TxHash> {
        self.pending_tx
    }

    pub fn packed(&self) -> bool {
        self.packed
    }

    /// Deduct `amount` and consume the next nonce, returning the nonce to sign with.
    ///
    /// Returns `None` without touching state if the balance cannot cover the amount.
    pub(crate) fn debit(&self, amount: u64) -> Option<u64> {
        let balance = self.balance();
        if amount == 0 || amount > balance {
            return None;
        }
        self.balance.store(balance - amount, Ordering::SeqCst);
        Some(self.nonce.fetch_add(1, Ordering::SeqCst))
    }

    /// Undo a [`Account::debit`].
    pub(crate) fn rollback(&self, amount: u64, nonce: u64) {
        self.balance.fetch_add(amount, Ordering::SeqCst);
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    /// Clear the funding reference once the funding transfer is final.
    pub(crate) fn mark_confirmed(&mut self) {
        self.pending_tx = None;
        self.packed = true;
    }
}

/// Shared pool of funded accounts.
///
/// A single mutex guards the structural list. The only sanctioned entry points
/// are [`snapshot`](Self::snapshot), [`replace`](Self::replace),
/// [`extend`](Self::extend) and the atomic filter [`retain`](Self::retain);
/// none of them is ever held across a network call.
#[derive(Clone, Default)]
pub struct AccountPool {
    inner: Arc<Mutex<PoolInner>>,
}

#[derive(Default)]
struct PoolInner {
    accounts: Vec<Arc<Account>>,
    addresses: HashSet<Address>,
}

impl PoolInner {
    fn push(&mut self, account: Arc<Account>) -> bool {
        if !self.addresses.insert(account.address) {
            warn!(address = %account.address, "Duplicate account ignored");
            return false;
        }
        self.accounts.push(account);
        true
    }
}

impl AccountPool {
    /// Create an empty account pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool seeded with the given accounts.
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let pool = Self::new();
        pool.extend(accounts);
        pool
    }

    /// Copy of the current account handles, taken under the lock.
    pub fn snapshot(&self) -> Vec<Arc<Account>> {
        self.inner.lock().accounts.clone()
    }

    /// Atomically swap the live list. Returns how many duplicates were dropped.
    pub fn replace(&self, accounts: Vec<Arc<Account>>) -> usize {
        let mut fresh = PoolInner::default();
        let mut dropped = 0;
        for account in accounts {
            if !fresh.push(account) {
                dropped += 1;
            }
        }
        *self.inner.lock() = fresh;
        dropped
    }

    /// Append accounts. Returns how many were added (duplicates are skipped).
    pub fn extend<I, A>(&self, accounts: I) -> usize
    where
        I: IntoIterator<Item = A>,
        A: Into<Arc<Account>>,
    {
        let mut guard = self.inner.lock();
        let mut added = 0;
        for account in accounts {
            if guard.push(account.into()) {
                added += 1;
            }
        }
        debug!(added, total = guard.accounts.len(), "Extended account pool");
        added
    }

    /// Keep only accounts matching `keep`, in one critical section. Returns
    /// how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&Account) -> bool) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let before = inner.accounts.len();
        let addresses = &mut inner.addresses;
        inner.accounts.retain(|account| {
            let kept = keep(account);
            if !kept {
                addresses.remove(&account.address);
            }
            kept
        });
        before - inner.accounts.len()
    }

    /// Total number of accounts.
    pub fn len(&self) -> usize {
        self.inner.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.inner.lock().addresses.contains(address)
    }

    /// Sum of balances across the pool.
    pub fn total_balance(&self) -> u64 {
        self.inner
            .lock()
            .accounts
            .iter()
            .map(|a| a.balance())
            .fold(0u64, u64::saturating_add)
    }
}
