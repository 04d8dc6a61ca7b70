//! Rate-limited Sender Loop.

use crate::accounts::{Account, AccountPool};
use crate::client::{LedgerClient, ShardClients};
use crate::config::SendFailurePolicy;
use crate::router::OutcomeSender;
use crate::runner::throttle::RateLimiter;
use crate::workloads::TransferWorkload;
use loadgen_types::{SignedTransfer, TxHash};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Statistics collected by the Sender Loop.
#[derive(Debug, Default)]
pub struct SenderStats {
    /// Submission calls, retries included.
    pub submitted: AtomicU64,
    /// Transfers the node accepted.
    pub accepted: AtomicU64,
    /// Transfers the node answered with a rejection.
    pub rejected: AtomicU64,
    /// Submissions that never got an answer.
    pub errors: AtomicU64,
    /// Transfers abandoned after every attempt failed.
    pub failed: AtomicU64,
    /// Failed transfers whose local deduction was restored.
    pub rolled_back: AtomicU64,
    /// Whole units deducted locally for transfers that never reached the network.
    pub unrecovered_amount: AtomicU64,
    /// Accounts skipped because no recipient key could be generated.
    pub key_errors: AtomicU64,
    /// Children handed to the Outcome Router.
    pub routed: AtomicU64,
    /// Completed passes over the pool.
    pub passes: AtomicU64,
}

impl SenderStats {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> SenderReport {
        SenderReport {
            submitted: self.submitted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            unrecovered_amount: self.unrecovered_amount.load(Ordering::Relaxed),
            key_errors: self.key_errors.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SenderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderReport {
    pub submitted: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub errors: u64,
    pub failed: u64,
    pub rolled_back: u64,
    pub unrecovered_amount: u64,
    pub key_errors: u64,
    pub routed: u64,
    pub passes: u64,
}

/// Cycles through the pool, sending one transfer per funded account per pass.
pub struct SenderLoop<C> {
    pool: AccountPool,
    clients: ShardClients<C>,
    workload: TransferWorkload,
    /// Absent in throughput-only mode; children are then discarded.
    router: Option<OutcomeSender>,
    limiter: RateLimiter,
    failure_policy: SendFailurePolicy,
    idle_backoff: Duration,
    progress_interval: Duration,
    rng: ChaCha8Rng,
    stats: Arc<SenderStats>,
}

impl<C: LedgerClient> SenderLoop<C> {
    pub fn new(
        pool: AccountPool,
        clients: ShardClients<C>,
        workload: TransferWorkload,
        target_tps: u64,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            pool,
            clients,
            workload,
            router: None,
            limiter: RateLimiter::new(target_tps),
            failure_policy: SendFailurePolicy::default(),
            idle_backoff: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            rng,
            stats: Arc::new(SenderStats::default()),
        }
    }

    /// Hand children to the Confirmation Tracker through `router`.
    pub fn with_router(mut self, router: OutcomeSender) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_failure_policy(mut self, policy: SendFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Shared counters, readable while the loop runs.
    pub fn stats(&self) -> Arc<SenderStats> {
        self.stats.clone()
    }

    /// Run passes until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> SenderReport {
        let start = Instant::now();
        let mut last_progress = start;

        info!(
            target_tps = self.limiter.tps(),
            policy = ?self.workload.policy(),
            on_failure = ?self.failure_policy,
            tracking = self.router.is_some(),
            pool = self.pool.len(),
            "Starting sender loop"
        );

        while !cancel.is_cancelled() {
            let processed = self.run_pass(&cancel).await;

            if processed == 0 {
                debug!(backoff = ?self.idle_backoff, "No funded accounts, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_backoff) => {}
                }
            }

            if last_progress.elapsed() >= self.progress_interval {
                self.log_progress(start.elapsed());
                last_progress = Instant::now();
            }
        }

        self.log_progress(start.elapsed());
        self.stats.snapshot()
    }

    /// One pass over a pool snapshot, then prune spent accounts.
    /// Returns the number of accounts a send was attempted for.
    pub async fn run_pass(&mut self, cancel: &CancellationToken) -> usize {
        let snapshot = self.pool.snapshot();
        debug!(accounts = snapshot.len(), "Starting pass");

        let mut processed = 0;
        for account in snapshot {
            if cancel.is_cancelled() {
                break;
            }
            if account.balance() == 0 {
                continue;
            }
            if !self.send_from(&account, cancel).await {
                continue;
            }
            processed += 1;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.limiter.tick() => {}
            }
        }

        let removed = self.pool.retain(|a| a.balance() > 0);
        if removed > 0 {
            debug!(removed, remaining = self.pool.len(), "Pruned spent accounts");
        }
        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        processed
    }

    /// Send one transfer from `account` to a fresh recipient on its shard.
    /// Returns false if no send was attempted.
    async fn send_from(&mut self, account: &Account, cancel: &CancellationToken) -> bool {
        let Some(amount) = self.workload.amount_for(account, &mut self.rng) else {
            return false;
        };

        let recipient = match self.workload.recipient_for(account.shard, &mut self.rng) {
            Ok(key) => key,
            Err(e) => {
                warn!(address = %account.address, error = %e, "Failed to generate recipient key");
                self.stats.key_errors.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        // Reserve before submitting: the amount leaves the balance and the
        // nonce advances whether or not the network ever sees the transfer.
        let Some(nonce) = account.debit(amount) else {
            return false;
        };
        let signed = self.workload.build(account, &recipient, amount, nonce);

        match self.submit(account, &signed).await {
            Some(hash) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                trace!(from = %account.address, tx = %hash, amount, nonce, "Transfer accepted");

                let child = Account::recipient(recipient, account.shard, amount, hash);
                self.route(child, cancel).await;
            }
            None => self.handle_failure(account, amount, nonce),
        }
        true
    }

    /// Submit with the configured number of attempts. Returns the hash of an
    /// accepted transfer.
    async fn submit(&self, account: &Account, signed: &SignedTransfer) -> Option<TxHash> {
        let client = match self.clients.client_for(account.shard) {
            Ok(client) => client,
            Err(e) => {
                warn!(address = %account.address, error = %e, "Cannot route transfer");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let attempts = match self.failure_policy {
            SendFailurePolicy::Retry { attempts } => attempts.saturating_add(1),
            SendFailurePolicy::Accept | SendFailurePolicy::Rollback => 1,
        };

        for attempt in 1..=attempts {
            self.stats.submitted.fetch_add(1, Ordering::Relaxed);
            match client.submit_transfer(signed).await {
                Ok(result) if result.accepted => return Some(result.hash),
                Ok(result) => {
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        from = %account.address,
                        nonce = signed.transfer.nonce,
                        attempt,
                        reason = result.error.as_deref().unwrap_or("unspecified"),
                        "Transfer rejected"
                    );
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        from = %account.address,
                        endpoint = client.endpoint(),
                        attempt,
                        error = %e,
                        "Failed to submit transfer"
                    );
                }
            }
        }
        None
    }

    fn handle_failure(&self, account: &Account, amount: u64, nonce: u64) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        match self.failure_policy {
            SendFailurePolicy::Rollback => {
                account.rollback(amount, nonce);
                self.stats.rolled_back.fetch_add(1, Ordering::Relaxed);
                debug!(address = %account.address, amount, nonce, "Rolled back failed transfer");
            }
            SendFailurePolicy::Accept | SendFailurePolicy::Retry { .. } => {
                self.stats
                    .unrecovered_amount
                    .fetch_add(amount, Ordering::Relaxed);
                warn!(
                    address = %account.address,
                    amount,
                    nonce,
                    "Keeping local deduction for failed transfer"
                );
            }
        }
    }

    async fn route(&mut self, child: Account, cancel: &CancellationToken) {
        let Some(router) = &self.router else {
            return;
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => return,
            sent = router.send(child) => sent,
        };

        match sent {
            Ok(()) => {
                self.stats.routed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(address = %e.0.address, "Outcome router closed, child account lost");
                self.router = None;
            }
        }
    }

    fn log_progress(&self, elapsed: Duration) {
        let stats = self.stats.snapshot();
        let secs = elapsed.as_secs_f64();
        let tps = if secs > 0.0 {
            stats.submitted as f64 / secs
        } else {
            0.0
        };
        info!(
            elapsed_s = elapsed.as_secs(),
            submitted = stats.submitted,
            accepted = stats.accepted,
            rejected = stats.rejected,
            errors = stats.errors,
            pool = self.pool.len(),
            tps = %format!("{tps:.1}"),
            "Sender progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::outcome_router;
    use crate::testing::MockLedger;
    use crate::workloads::AmountPolicy;
    use loadgen_types::{KeyPair, ShardId};
    use rand::SeedableRng;

    const SHARDS: u64 = 1;

    fn funded(seed: u8, balance: u64, nonce: u64) -> Account {
        Account::funded(KeyPair::from_seed(&[seed; 32]), SHARDS, balance, nonce)
    }

    fn sender(
        pool: &AccountPool,
        ledger: &MockLedger,
        policy: AmountPolicy,
        tps: u64,
    ) -> SenderLoop<MockLedger> {
        let mut clients = ShardClients::new();
        clients.insert(ShardId(0), ledger.clone());
        let workload = TransferWorkload::new(SHARDS)
            .with_policy(policy)
            .with_denomination(1);
        SenderLoop::new(
            pool.clone(),
            clients,
            workload,
            tps,
            ChaCha8Rng::seed_from_u64(42),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_pass_minimal() {
        let pool = AccountPool::from_accounts(vec![funded(1, 100, 0)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        let (tx, mut rx) = outcome_router(8);
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 1).with_router(tx);

        let processed = sender.run_pass(&CancellationToken::new()).await;
        assert_eq!(processed, 1);

        let account = &pool.snapshot()[0];
        assert_eq!(account.balance(), 99);
        assert_eq!(account.nonce(), 1);

        let submitted = ledger.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].transfer.amount, 1);
        assert_eq!(submitted[0].transfer.nonce, 0);

        let child = rx.try_recv().expect("child enqueued");
        assert_eq!(child.balance(), 1);
        assert_eq!(child.nonce(), 0);
        assert!(!child.packed());
        assert_eq!(child.pending_tx(), Some(submitted[0].hash));
        assert_eq!(child.shard, account.shard);
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_randomized_amounts_conserve_value() {
        let pool = AccountPool::from_accounts(vec![funded(1, 50, 3), funded(2, 7, 0)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        let (tx, mut rx) = outcome_router(64);
        let mut sender = sender(&pool, &ledger, AmountPolicy::Randomized, 100).with_router(tx);

        let cancel = CancellationToken::new();
        for _ in 0..3 {
            sender.run_pass(&cancel).await;
        }

        let mut children_total = 0;
        while let Some(child) = rx.try_recv() {
            assert!(child.balance() >= 1);
            children_total += child.balance();
        }
        assert_eq!(pool.total_balance() + children_total, 57);

        // Nonces advance by exactly one per accepted transfer.
        let first = funded(1, 0, 0).address;
        let nonces: Vec<u64> = ledger
            .submitted()
            .iter()
            .filter(|t| t.transfer.from == first)
            .map(|t| t.transfer.nonce)
            .collect();
        assert_eq!(nonces, vec![3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spent_accounts_pruned_after_pass() {
        let pool = AccountPool::from_accounts(vec![funded(1, 1, 0), funded(2, 5, 0)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 10);

        sender.run_pass(&CancellationToken::new()).await;
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.snapshot()[0].balance(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_policy_accept_keeps_deduction() {
        let pool = AccountPool::from_accounts(vec![funded(1, 10, 0)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        ledger.fail_submissions(true);
        let (tx, mut rx) = outcome_router(8);
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 10).with_router(tx);

        sender.run_pass(&CancellationToken::new()).await;
        let account = &pool.snapshot()[0];
        assert_eq!(account.balance(), 9);
        assert_eq!(account.nonce(), 1);
        assert!(rx.try_recv().is_none(), "no reference to track");

        let stats = sender.stats().snapshot();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.unrecovered_amount, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_policy_rollback_restores_state() {
        let pool = AccountPool::from_accounts(vec![funded(1, 10, 4)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        ledger.reject_submissions(true);
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 10)
            .with_failure_policy(SendFailurePolicy::Rollback);

        sender.run_pass(&CancellationToken::new()).await;
        let account = &pool.snapshot()[0];
        assert_eq!(account.balance(), 10);
        assert_eq!(account.nonce(), 4);
        assert_eq!(sender.stats().snapshot().rolled_back, 1);
        assert_eq!(sender.stats().snapshot().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_policy_retry_resubmits_same_transfer() {
        let pool = AccountPool::from_accounts(vec![funded(1, 10, 0)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        ledger.fail_next_submissions(2);
        let (tx, mut rx) = outcome_router(8);
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 10)
            .with_router(tx)
            .with_failure_policy(SendFailurePolicy::Retry { attempts: 2 });

        sender.run_pass(&CancellationToken::new()).await;
        assert_eq!(ledger.submit_attempts(), 3);
        assert_eq!(ledger.submitted().len(), 1);
        assert_eq!(ledger.submitted()[0].transfer.nonce, 0);
        assert!(rx.try_recv().is_some());

        let stats = sender.stats().snapshot();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_ceiling() {
        let accounts = (1..=20).map(|seed| funded(seed, 10, 0)).collect();
        let pool = AccountPool::from_accounts(accounts);
        let ledger = MockLedger::new("shard0", ShardId(0));
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 5);

        let start = Instant::now();
        sender.run_pass(&CancellationToken::new()).await;
        assert_eq!(ledger.submitted().len(), 20);
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pool_backs_off_without_error() {
        let pool = AccountPool::new();
        let ledger = MockLedger::new("shard0", ShardId(0));
        let sender = sender(&pool, &ledger, AmountPolicy::Minimal, 3)
            .with_idle_backoff(Duration::from_secs(1));
        let stats = sender.stats();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sender.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(5500)).await;
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(report.submitted, 0);
        // One pass per backoff period, not a busy loop.
        let passes = stats.passes.load(Ordering::Relaxed);
        assert!((5..=7).contains(&passes), "passes = {passes}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_only_discards_children() {
        let pool = AccountPool::from_accounts(vec![funded(1, 3, 0)]);
        let ledger = MockLedger::new("shard0", ShardId(0));
        let mut sender = sender(&pool, &ledger, AmountPolicy::Minimal, 10);

        let cancel = CancellationToken::new();
        for _ in 0..3 {
            sender.run_pass(&cancel).await;
        }
        assert_eq!(ledger.submitted().len(), 3);
        assert!(pool.is_empty());
        assert_eq!(sender.stats().snapshot().routed, 0);
    }
}
