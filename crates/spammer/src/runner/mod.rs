//! Harness runner that wires the Sender Loop and the Confirmation Tracker
//! together around a shared Account Pool.

mod sender;
mod throttle;

pub use sender::{SenderLoop, SenderReport, SenderStats};
pub use throttle::RateLimiter;

use crate::accounts::AccountPool;
use crate::bootstrap::{self, BootstrapError};
use crate::client::{ClientError, LedgerClient, ShardClients};
use crate::config::{ConfigError, HarnessConfig};
use crate::router::outcome_router;
use crate::tracker::{ConfirmationTracker, TrackerReport};
use crate::workloads::TransferWorkload;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Load generator bound to a seeded pool and a shard routing table.
pub struct Harness<C> {
    config: HarnessConfig,
    pool: AccountPool,
    clients: ShardClients<C>,
}

impl<C: LedgerClient> Harness<C> {
    /// Create a harness over an already seeded pool.
    pub fn new(
        config: HarnessConfig,
        pool: AccountPool,
        clients: ShardClients<C>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        clients.validate()?;
        Ok(Self {
            config,
            pool,
            clients,
        })
    }

    /// Load the configured key file and seed the pool from the network.
    pub async fn bootstrap(
        config: HarnessConfig,
        clients: ShardClients<C>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        clients.validate()?;

        let keys = bootstrap::load_keys(&config.key_file)?;
        let pool = bootstrap::seed_accounts(keys, &clients, config.num_shards).await?;

        Ok(Self {
            config,
            pool,
            clients,
        })
    }

    /// The shared account pool.
    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    /// Run for `duration`, then stop both loops.
    pub async fn run_for(self, duration: Duration) -> Result<HarnessReport, HarnessError> {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            cancel_clone.cancel();
        });

        self.run_until_cancelled(cancel).await
    }

    /// Run both loops until `cancel` fires and both have stopped.
    pub async fn run_until_cancelled(
        self,
        cancel: CancellationToken,
    ) -> Result<HarnessReport, HarnessError> {
        let start = Instant::now();
        let config = &self.config;

        let seed = config.seed.unwrap_or_else(time_seed);
        let workload = TransferWorkload::new(config.num_shards)
            .with_policy(config.amount_policy())
            .with_fee(config.fee)
            .with_denomination(config.denomination);

        let mut sender = SenderLoop::new(
            self.pool.clone(),
            self.clients.clone(),
            workload,
            config.target_tps,
            ChaCha8Rng::seed_from_u64(seed),
        )
        .with_failure_policy(config.send_failure_policy)
        .with_idle_backoff(config.idle_backoff)
        .with_progress_interval(config.progress_interval);

        let tracker_handle = if config.tracking_enabled() {
            let (router_tx, router_rx) = outcome_router(config.router_capacity);
            sender = sender.with_router(router_tx);

            let tracker =
                ConfirmationTracker::new(self.pool.clone(), self.clients.clone(), router_rx)
                    .with_poll_interval(config.poll_interval)
                    .with_sweep_interval(config.sweep_interval)
                    .with_cooldown(config.cooldown);
            Some(tokio::spawn(tracker.run(cancel.clone())))
        } else {
            None
        };

        info!(
            accounts = self.pool.len(),
            shards = self.clients.len(),
            target_tps = config.target_tps,
            throughput_only = config.throughput_only,
            seed,
            "Starting harness"
        );

        let sender_handle = tokio::spawn(sender.run(cancel.clone()));

        let sender_report = sender_handle
            .await
            .map_err(|e| HarnessError::TaskFailed(format!("sender loop: {e}")))?;
        let tracker_report = match tracker_handle {
            Some(handle) => Some(
                handle
                    .await
                    .map_err(|e| HarnessError::TaskFailed(format!("confirmation tracker: {e}")))?,
            ),
            None => None,
        };

        Ok(HarnessReport {
            duration: start.elapsed(),
            sender: sender_report,
            tracker: tracker_report,
            pool_size: self.pool.len(),
            pool_balance: self.pool.total_balance(),
        })
    }
}

fn time_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Report generated after a harness run.
pub struct HarnessReport {
    /// Total duration of the run.
    pub duration: Duration,
    /// Sender Loop counters.
    pub sender: SenderReport,
    /// Confirmation tracking outcome, absent in throughput-only mode.
    pub tracker: Option<TrackerReport>,
    /// Accounts left in the pool.
    pub pool_size: usize,
    /// Local balance left in the pool, in whole units.
    pub pool_balance: u64,
}

impl HarnessReport {
    /// Average submission calls per second.
    pub fn avg_tps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.sender.submitted as f64 / secs
        } else {
            0.0
        }
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Load Generator Report ===");
        println!("Duration:  {:?}", self.duration);
        println!("Submitted: {}", self.sender.submitted);
        println!("Accepted:  {}", self.sender.accepted);
        println!("Rejected:  {}", self.sender.rejected);
        println!("Errors:    {}", self.sender.errors);
        println!("Avg TPS:   {:.2}", self.avg_tps());
        if self.sender.failed > 0 {
            println!(
                "Failed transfers: {} ({} rolled back, {} units deducted locally)",
                self.sender.failed, self.sender.rolled_back, self.sender.unrecovered_amount
            );
        }
        println!(
            "Pool:      {} accounts, {} units",
            self.pool_size, self.pool_balance
        );

        if let Some(ref tracker) = self.tracker {
            tracker.print();
        }
    }
}

/// Errors that stop the harness from starting or finishing.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client setup error: {0}")]
    Client(#[from] ClientError),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}
