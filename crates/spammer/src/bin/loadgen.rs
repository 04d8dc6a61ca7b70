//! Ledger Load Generator CLI
//!
//! Sends transfers to a sharded ledger at a capped rate and recycles funded
//! accounts once their funding transfers are confirmed.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use loadgen_spammer::client::JsonRpcClient;
use loadgen_spammer::config::{ConfigFile, HarnessConfig, SendFailurePolicy};
use loadgen_spammer::runner::Harness;
use loadgen_spammer::ShardClients;
use loadgen_types::{KeyPair, ShardId};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loadgen")]
#[command(about = "Transfer load generator for sharded ledger networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send transfers periodically from the accounts in a key file
    Sendtx(SendTxArgs),

    /// Generate private keys for a key file
    Keygen {
        /// Number of keys to generate
        #[arg(long, default_value = "10")]
        count: usize,

        /// Only generate keys whose address lands on this shard
        #[arg(long)]
        shard: Option<u64>,

        /// Number of shards
        #[arg(long, default_value = "2")]
        num_shards: u64,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// RNG seed, for reproducible key sets
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Args)]
struct SendTxArgs {
    /// Key store file, one hex private key per line [default: keystore.txt]
    #[arg(short = 'f', long)]
    keyfile: Option<PathBuf>,

    /// Target tps to send transactions [default: 3]
    #[arg(long)]
    tps: Option<u64>,

    /// Print more debug info
    #[arg(short, long)]
    debug: bool,

    /// Transfer one unit at a time and skip balance recycling. Used for
    /// large tps tests.
    #[arg(long)]
    onlytps: bool,

    /// RPC endpoints (comma-separated, one per shard)
    #[arg(short, long, value_delimiter = ',')]
    endpoints: Option<Vec<String>>,

    /// Number of shards [default: 2]
    #[arg(long)]
    num_shards: Option<u64>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Time an included transfer must age before its account is reused (e.g. "2m")
    #[arg(long)]
    cooldown: Option<humantime::Duration>,

    /// Transaction status poll interval (e.g. "30s")
    #[arg(long)]
    poll_interval: Option<humantime::Duration>,

    /// Cool-down sweep interval (e.g. "30s")
    #[arg(long)]
    sweep_interval: Option<humantime::Duration>,

    /// What to do with local balance and nonce after a failed send
    /// (accept, rollback, retry, retry:N)
    #[arg(long)]
    on_send_failure: Option<SendFailurePolicy>,

    /// Fee attached to every transfer, in base units
    #[arg(long)]
    fee: Option<u64>,

    /// RNG seed for amounts and recipient keys
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this long (e.g. "10m"). Runs until Ctrl+C otherwise.
    #[arg(long)]
    duration: Option<humantime::Duration>,
}

impl SendTxArgs {
    fn to_config(&self) -> Result<HarnessConfig> {
        let mut config = HarnessConfig::default();

        if let Some(path) = &self.config {
            let file = ConfigFile::load(path)?;
            config = config
                .apply_file(file)
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
        }

        if let Some(endpoints) = &self.endpoints {
            config.endpoints = endpoints.clone();
        }
        if let Some(num_shards) = self.num_shards {
            config = config.with_num_shards(num_shards);
        }
        if let Some(keyfile) = &self.keyfile {
            config = config.with_key_file(keyfile);
        }
        if let Some(tps) = self.tps {
            config = config.with_target_tps(tps);
        }
        if self.onlytps {
            config = config.with_throughput_only(true);
        }
        if let Some(cooldown) = self.cooldown {
            config = config.with_cooldown(*cooldown);
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_poll_interval(*interval);
        }
        if let Some(interval) = self.sweep_interval {
            config = config.with_sweep_interval(*interval);
        }
        if let Some(policy) = self.on_send_failure {
            config = config.with_send_failure_policy(policy);
        }
        if let Some(fee) = self.fee {
            config = config.with_fee(fee);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sendtx(args) => {
            let default_filter = if args.debug {
                "debug"
            } else {
                "info,loadgen_spammer=info"
            };
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(default_filter)),
                )
                .init();

            send_tx(args).await
        }

        Commands::Keygen {
            count,
            shard,
            num_shards,
            output,
            seed,
        } => keygen(count, shard.map(ShardId), num_shards, output, seed),
    }
}

async fn send_tx(args: SendTxArgs) -> Result<()> {
    let config = args.to_config()?;

    info!(
        endpoints = ?config.endpoints,
        num_shards = config.num_shards,
        key_file = %config.key_file.display(),
        tps = config.target_tps,
        throughput_only = config.throughput_only,
        "Load generator starting"
    );

    let clients = config
        .endpoints
        .iter()
        .map(|endpoint| {
            JsonRpcClient::new(endpoint.clone(), config.request_timeout)
                .map(|client| client.with_denomination(config.denomination))
                .with_context(|| format!("Failed to create RPC client for {endpoint}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let clients = ShardClients::discover(clients, config.num_shards)
        .await
        .context("Failed to resolve endpoint shards")?;

    let harness = Harness::bootstrap(config, clients)
        .await
        .context("Failed to seed account pool")?;

    if harness.pool().is_empty() {
        warn!("No funded accounts found; nothing will be sent until the pool is refilled");
    }

    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());

    if let Some(duration) = args.duration {
        let cancel = cancel.clone();
        let duration = *duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            info!(?duration, "Run duration elapsed");
            cancel.cancel();
        });
    }

    let report = harness.run_until_cancelled(cancel).await?;
    report.print();
    Ok(())
}

fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
        }

        info!("Stopping sender and tracker...");
        cancel.cancel();
    });
}

fn keygen(
    count: usize,
    shard: Option<ShardId>,
    num_shards: u64,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    if num_shards == 0 {
        bail!("Number of shards must be greater than 0");
    }

    let mut rng: Box<dyn RngCore> = match seed {
        Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
        None => Box::new(rand::thread_rng()),
    };

    let mut lines = String::new();
    for _ in 0..count {
        let key = match shard {
            Some(shard) => KeyPair::generate_on_shard(shard, num_shards, &mut *rng)?,
            None => KeyPair::generate(&mut *rng),
        };
        lines.push_str(&key.to_hex());
        lines.push('\n');
    }

    match output {
        Some(path) => {
            std::fs::write(&path, lines)
                .with_context(|| format!("Failed to write key file: {}", path.display()))?;
            eprintln!("Wrote {count} keys to {}", path.display());
        }
        None => {
            std::io::stdout()
                .write_all(lines.as_bytes())
                .context("Failed to write keys to stdout")?;
        }
    }

    Ok(())
}
