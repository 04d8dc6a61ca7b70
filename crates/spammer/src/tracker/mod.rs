//! Confirmation Tracker.
//!
//! Drains the Outcome Router and follows every recipient account through
//! `tracked -> included -> confirmed`:
//!
//! - **tracked**: received from the router, waiting for its funding transfer
//!   to show up in a block. Every poll tick re-classifies all of them.
//! - **included**: a poll saw the transfer in a block. The account moves into
//!   a confirm-waiting bucket stamped with the end of that poll.
//! - **confirmed**: the bucket has aged past the cool-down window. A sweep
//!   tick pops it and hands its accounts back to the [`AccountPool`].
//!
//! The tracker owns all of this state; the only shared structure it touches
//! is the pool, through [`AccountPool::extend`].

use crate::accounts::{Account, AccountPool};
use crate::client::{LedgerClient, ShardClients, TxStatus};
use crate::latency::{LatencyRecorder, LatencyReport};
use crate::router::OutcomeReceiver;
use loadgen_types::TxHash;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Default status poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default cool-down sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default cool-down window.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

/// A recipient waiting for its funding transfer to be included.
struct TrackedAccount {
    account: Account,
    received_at: Instant,
}

/// Counters shared with progress reporting.
#[derive(Debug, Default)]
pub struct TrackerStats {
    /// Accounts received from the router.
    pub received: AtomicU64,
    /// Accounts whose funding transfer was seen in a block.
    pub included: AtomicU64,
    /// Accounts handed back to the pool.
    pub confirmed: AtomicU64,
    /// Accounts dropped because they carried no transaction reference.
    pub dropped: AtomicU64,
    /// Completed poll cycles.
    pub polls: AtomicU64,
    /// Accounts currently tracked.
    pub tracked: AtomicU64,
    /// Accounts currently in confirm-waiting buckets.
    pub waiting: AtomicU64,
}

/// Polls transaction status and re-admits confirmed accounts.
pub struct ConfirmationTracker<C> {
    pool: AccountPool,
    clients: ShardClients<C>,
    receiver: OutcomeReceiver,
    poll_interval: Duration,
    sweep_interval: Duration,
    cooldown: Duration,
    tracked: Vec<TrackedAccount>,
    /// Confirm-waiting buckets, oldest first.
    buckets: VecDeque<(Instant, Vec<Account>)>,
    latency: LatencyRecorder,
    stats: Arc<TrackerStats>,
}

impl<C: LedgerClient> ConfirmationTracker<C> {
    pub fn new(pool: AccountPool, clients: ShardClients<C>, receiver: OutcomeReceiver) -> Self {
        Self {
            pool,
            clients,
            receiver,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            cooldown: DEFAULT_COOLDOWN,
            tracked: Vec::new(),
            buckets: VecDeque::new(),
            latency: LatencyRecorder::new(),
            stats: Arc::new(TrackerStats::default()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Shared counters, readable while the tracker runs.
    pub fn stats(&self) -> Arc<TrackerStats> {
        self.stats.clone()
    }

    /// Run until `cancel` fires, then report.
    ///
    /// Both timers first fire one interval after start. Router items and
    /// timer ticks are served in whatever order they become ready.
    pub async fn run(mut self, cancel: CancellationToken) -> TrackerReport {
        let start = Instant::now();
        let mut poll_tick =
            tokio::time::interval_at(start + self.poll_interval, self.poll_interval);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep_tick =
            tokio::time::interval_at(start + self.sweep_interval, self.sweep_interval);
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut router_open = true;

        info!(
            poll_interval = ?self.poll_interval,
            sweep_interval = ?self.sweep_interval,
            cooldown = ?self.cooldown,
            "Starting confirmation tracker"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                item = self.receiver.recv(), if router_open => match item {
                    Some(account) => self.admit(account),
                    None => {
                        debug!("Outcome router closed");
                        router_open = false;
                    }
                },

                _ = poll_tick.tick() => self.poll_once().await,

                _ = sweep_tick.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }

        // Pick up anything the sender managed to enqueue before stopping.
        while let Some(account) = self.receiver.try_recv() {
            self.admit(account);
        }

        let report = self.report();
        info!(
            tracked = report.still_tracked,
            waiting = report.still_waiting,
            "Confirmation tracker stopped"
        );
        report
    }

    fn admit(&mut self, account: Account) {
        trace!(address = %account.address, tx = ?account.pending_tx(), "Tracking account");
        self.tracked.push(TrackedAccount {
            account,
            received_at: Instant::now(),
        });
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        self.update_gauges();
    }

    /// Classify every tracked account. Included ones share one new bucket.
    async fn poll_once(&mut self) {
        let to_check = std::mem::take(&mut self.tracked);
        let mut still_pending = Vec::with_capacity(to_check.len());
        let mut included = Vec::new();

        for entry in to_check {
            let Some(hash) = entry.account.pending_tx() else {
                warn!(
                    address = %entry.account.address,
                    "Tracked account has no transaction reference, dropping"
                );
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            if self.is_included(&entry.account, &hash).await {
                self.latency.record(entry.received_at.elapsed());
                included.push(entry.account);
            } else {
                still_pending.push(entry);
            }
        }

        self.tracked = still_pending;
        self.stats.polls.fetch_add(1, Ordering::Relaxed);

        if !included.is_empty() {
            debug!(
                included = included.len(),
                pending = self.tracked.len(),
                "Accounts included"
            );
            self.stats
                .included
                .fetch_add(included.len() as u64, Ordering::Relaxed);
            self.buckets.push_back((Instant::now(), included));
        }
        self.update_gauges();
    }

    /// Whether the node serving `account` reports `hash` in a block. Anything
    /// else, including failures, counts as still pending.
    async fn is_included(&self, account: &Account, hash: &TxHash) -> bool {
        let client = match self.clients.client_for(account.shard) {
            Ok(client) => client,
            Err(e) => {
                debug!(address = %account.address, error = %e, "No client for tracked account");
                return false;
            }
        };

        match client.get_transaction(hash).await {
            Ok(Some(TxStatus::Block)) => true,
            Ok(Some(status)) => {
                trace!(tx = %hash, ?status, "Transaction pending");
                false
            }
            Ok(None) => {
                trace!(tx = %hash, "Transaction unknown to node");
                false
            }
            Err(e) => {
                warn!(tx = %hash, endpoint = client.endpoint(), error = %e, "Status poll failed");
                false
            }
        }
    }

    /// Re-admit every bucket that is at least `cooldown` old at `now`.
    /// Returns the number of accounts added to the pool.
    ///
    /// Buckets are popped before their accounts reach the pool, so a bucket
    /// is re-admitted at most once however many sweeps observe it.
    fn sweep(&mut self, now: Instant) -> usize {
        let mut confirmed = Vec::new();
        while self
            .buckets
            .front()
            .is_some_and(|(created, _)| now.saturating_duration_since(*created) >= self.cooldown)
        {
            if let Some((_, accounts)) = self.buckets.pop_front() {
                confirmed.extend(accounts);
            }
        }

        if confirmed.is_empty() {
            return 0;
        }

        for account in &mut confirmed {
            account.mark_confirmed();
        }
        let count = confirmed.len();
        let added = self.pool.extend(confirmed);
        if added < count {
            warn!(count, added, "Some confirmed accounts were already in the pool");
        }

        self.stats
            .confirmed
            .fetch_add(count as u64, Ordering::Relaxed);
        self.update_gauges();
        info!(confirmed = count, pool = self.pool.len(), "Re-admitted confirmed accounts");
        added
    }

    fn waiting_len(&self) -> usize {
        self.buckets.iter().map(|(_, accounts)| accounts.len()).sum()
    }

    fn update_gauges(&self) {
        self.stats
            .tracked
            .store(self.tracked.len() as u64, Ordering::Relaxed);
        self.stats
            .waiting
            .store(self.waiting_len() as u64, Ordering::Relaxed);
    }

    fn report(&self) -> TrackerReport {
        TrackerReport {
            received: self.stats.received.load(Ordering::Relaxed),
            included: self.stats.included.load(Ordering::Relaxed),
            confirmed: self.stats.confirmed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            polls: self.stats.polls.load(Ordering::Relaxed),
            still_tracked: self.tracked.len(),
            still_waiting: self.waiting_len(),
            latency: self.latency.report(),
        }
    }
}

/// Final state of a tracker run.
pub struct TrackerReport {
    pub received: u64,
    pub included: u64,
    pub confirmed: u64,
    pub dropped: u64,
    pub polls: u64,
    /// Accounts whose funding transfer was never seen in a block.
    pub still_tracked: usize,
    /// Included accounts still inside the cool-down window.
    pub still_waiting: usize,
    pub latency: LatencyReport,
}

impl TrackerReport {
    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n--- Confirmation Tracking ---");
        println!("Received:  {}", self.received);
        println!("Included:  {}", self.included);
        println!("Confirmed: {}", self.confirmed);
        println!("Dropped:   {}", self.dropped);
        println!("Polls:     {}", self.polls);
        println!(
            "Outstanding: {} tracked, {} cooling down",
            self.still_tracked, self.still_waiting
        );
        self.latency.print_summary();
    }
}
