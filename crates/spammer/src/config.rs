//! Configuration types for the harness.

use crate::workloads::AmountPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default key file path.
pub const DEFAULT_KEY_FILE: &str = "keystore.txt";

/// Default Outcome Router capacity.
pub const DEFAULT_ROUTER_CAPACITY: usize = 100_000;

/// Base units per whole unit used by the default JSON-RPC client.
pub const DEFAULT_DENOMINATION: u64 = 100_000_000;

/// What the Sender Loop does with its local bookkeeping when a submission fails.
///
/// The amount is deducted and the nonce incremented before submitting, so a
/// failed submission leaves the model out of step with the network. Which
/// correction (if any) is right depends on why submissions fail, so it is a
/// policy rather than a fixed behaviour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SendFailurePolicy {
    /// Keep the deduction and the nonce increment. The account silently loses
    /// spendable balance in the model; the real network balance is unaffected.
    #[default]
    Accept,

    /// Restore the deducted amount and the previous nonce.
    Rollback,

    /// Resubmit the same signed transfer up to `attempts` more times, then
    /// behave as `Accept`.
    Retry { attempts: u32 },
}

impl FromStr for SendFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "rollback" => Ok(Self::Rollback),
            "retry" => Ok(Self::Retry { attempts: 1 }),
            s if s.starts_with("retry:") => {
                let attempts = s[6..]
                    .parse()
                    .map_err(|_| ConfigError::InvalidFailurePolicy(s.to_string()))?;
                Ok(Self::Retry { attempts })
            }
            _ => Err(ConfigError::InvalidFailurePolicy(s.to_string())),
        }
    }
}

/// Configuration for the load generation harness.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// RPC endpoints. Each one serves exactly one shard, discovered at startup.
    pub endpoints: Vec<String>,

    /// Number of shards in the network.
    pub num_shards: u64,

    /// Newline-separated list of hex-encoded private keys.
    pub key_file: PathBuf,

    /// Ceiling on processed accounts per second.
    pub target_tps: u64,

    /// Send the minimal unit every time and skip confirmation tracking.
    pub throughput_only: bool,

    /// Handling of local balance/nonce after a failed submission.
    pub send_failure_policy: SendFailurePolicy,

    /// Fee attached to every transfer.
    pub fee: u64,

    /// Outcome Router capacity. A full router blocks the sender.
    pub router_capacity: usize,

    /// How often tracked transactions are re-classified.
    pub poll_interval: Duration,

    /// How often confirm-waiting buckets are checked for cool-down expiry.
    pub sweep_interval: Duration,

    /// Minimum time an included account waits before returning to the pool.
    pub cooldown: Duration,

    /// Sender wait when the pool is empty.
    pub idle_backoff: Duration,

    /// Interval between progress reports.
    pub progress_interval: Duration,

    /// Per-request RPC timeout.
    pub request_timeout: Duration,

    /// Base units per whole unit on the wire.
    pub denomination: u64,

    /// RNG seed for amounts and recipient keys. Time-derived when unset.
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:8027".into()],
            num_shards: 2,
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            target_tps: 3,
            throughput_only: false,
            send_failure_policy: SendFailurePolicy::Accept,
            fee: 0,
            router_capacity: DEFAULT_ROUTER_CAPACITY,
            poll_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(30),
            cooldown: Duration::from_secs(120),
            idle_backoff: Duration::from_secs(1),
            progress_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            denomination: DEFAULT_DENOMINATION,
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Create a new configuration with the given endpoints.
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            ..Default::default()
        }
    }

    /// Set the number of shards.
    pub fn with_num_shards(mut self, num_shards: u64) -> Self {
        self.num_shards = num_shards;
        self
    }

    /// Set the key file path.
    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = path.into();
        self
    }

    /// Set target TPS.
    pub fn with_target_tps(mut self, tps: u64) -> Self {
        self.target_tps = tps;
        self
    }

    /// Enable or disable throughput-only mode.
    pub fn with_throughput_only(mut self, enabled: bool) -> Self {
        self.throughput_only = enabled;
        self
    }

    /// Set the failed-submission policy.
    pub fn with_send_failure_policy(mut self, policy: SendFailurePolicy) -> Self {
        self.send_failure_policy = policy;
        self
    }

    /// Set the transfer fee.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Set the router capacity.
    pub fn with_router_capacity(mut self, capacity: usize) -> Self {
        self.router_capacity = capacity;
        self
    }

    /// Set the status poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the cool-down sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the cool-down window.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the empty-pool backoff.
    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Set the progress report interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the per-request RPC timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Amount policy implied by the run mode.
    pub fn amount_policy(&self) -> AmountPolicy {
        if self.throughput_only {
            AmountPolicy::Minimal
        } else {
            AmountPolicy::Randomized
        }
    }

    /// Whether the Confirmation Tracker runs.
    pub fn tracking_enabled(&self) -> bool {
        !self.throughput_only
    }

    /// Overlay values from a config file. Fields absent in the file are kept.
    pub fn apply_file(mut self, file: ConfigFile) -> Result<Self, ConfigError> {
        if let Some(endpoints) = file.endpoints {
            self.endpoints = endpoints;
        }
        if let Some(num_shards) = file.num_shards {
            self.num_shards = num_shards;
        }
        if let Some(key_file) = file.key_file {
            self.key_file = key_file;
        }
        if let Some(tps) = file.tps {
            self.target_tps = tps;
        }
        if let Some(only_tps) = file.only_tps {
            self.throughput_only = only_tps;
        }
        if let Some(policy) = file.on_send_failure {
            self.send_failure_policy = policy.parse()?;
        }
        if let Some(fee) = file.fee {
            self.fee = fee;
        }
        if let Some(capacity) = file.router_capacity {
            self.router_capacity = capacity;
        }
        if let Some(denomination) = file.denomination {
            self.denomination = denomination;
        }
        if let Some(seed) = file.seed {
            self.seed = Some(seed);
        }

        let durations = [
            (file.poll_interval, &mut self.poll_interval),
            (file.sweep_interval, &mut self.sweep_interval),
            (file.cooldown, &mut self.cooldown),
            (file.idle_backoff, &mut self.idle_backoff),
            (file.progress_interval, &mut self.progress_interval),
            (file.request_timeout, &mut self.request_timeout),
        ];
        for (value, target) in durations {
            if let Some(value) = value {
                *target = humantime::parse_duration(&value)
                    .map_err(|e| ConfigError::InvalidDuration(value.clone(), e.to_string()))?;
            }
        }

        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.num_shards == 0 {
            return Err(ConfigError::InvalidShards);
        }
        if self.target_tps == 0 {
            return Err(ConfigError::InvalidTps);
        }
        if self.router_capacity == 0 {
            return Err(ConfigError::InvalidRouterCapacity);
        }
        if self.denomination == 0 {
            return Err(ConfigError::InvalidDenomination);
        }
        for (name, interval) in [
            ("poll_interval", self.poll_interval),
            ("sweep_interval", self.sweep_interval),
            ("idle_backoff", self.idle_backoff),
            ("progress_interval", self.progress_interval),
            ("request_timeout", self.request_timeout),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::ZeroInterval(name));
            }
        }
        Ok(())
    }
}

/// On-disk TOML configuration. Every field is optional; durations use
/// humantime syntax such as `"30s"` or `"2m"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub endpoints: Option<Vec<String>>,
    pub num_shards: Option<u64>,
    pub key_file: Option<PathBuf>,
    pub tps: Option<u64>,
    pub only_tps: Option<bool>,
    pub on_send_failure: Option<String>,
    pub fee: Option<u64>,
    pub router_capacity: Option<usize>,
    pub poll_interval: Option<String>,
    pub sweep_interval: Option<String>,
    pub cooldown: Option<String>,
    pub idle_backoff: Option<String>,
    pub progress_interval: Option<String>,
    pub request_timeout: Option<String>,
    pub denomination: Option<u64>,
    pub seed: Option<u64>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No RPC endpoints configured")]
    NoEndpoints,

    #[error("Number of shards must be greater than 0")]
    InvalidShards,

    #[error("Target TPS must be greater than 0")]
    InvalidTps,

    #[error("Router capacity must be greater than 0")]
    InvalidRouterCapacity,

    #[error("Denomination must be greater than 0")]
    InvalidDenomination,

    #[error("{0} must be non-zero")]
    ZeroInterval(&'static str),

    #[error("Unknown send failure policy: {0} (expected accept, rollback, retry or retry:N)")]
    InvalidFailurePolicy(String),

    #[error("Invalid duration {0:?}: {1}")]
    InvalidDuration(String, String),

    #[error("Failed to read config file {}: {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.target_tps, 3);
        assert_eq!(config.key_file, PathBuf::from("keystore.txt"));
        assert_eq!(config.router_capacity, 100_000);
        assert_eq!(config.cooldown, Duration::from_secs(120));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_selects_amount_policy_and_tracking() {
        let config = HarnessConfig::default();
        assert_eq!(config.amount_policy(), AmountPolicy::Randomized);
        assert!(config.tracking_enabled());

        let config = config.with_throughput_only(true);
        assert_eq!(config.amount_policy(), AmountPolicy::Minimal);
        assert!(!config.tracking_enabled());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            HarnessConfig::new(vec![]).validate(),
            Err(ConfigError::NoEndpoints)
        ));
        assert!(matches!(
            HarnessConfig::default().with_target_tps(0).validate(),
            Err(ConfigError::InvalidTps)
        ));
        assert!(matches!(
            HarnessConfig::default().with_num_shards(0).validate(),
            Err(ConfigError::InvalidShards)
        ));
        assert!(matches!(
            HarnessConfig::default()
                .with_poll_interval(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroInterval("poll_interval"))
        ));
    }

    #[test]
    fn test_zero_idle_backoff_rejected() {
        assert!(matches!(
            HarnessConfig::default()
                .with_idle_backoff(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroInterval("idle_backoff"))
        ));

        let file = ConfigFile::parse("idle_backoff = \"0s\"").unwrap();
        let config = HarnessConfig::default().apply_file(file).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroInterval("idle_backoff"))
        ));
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!(
            "accept".parse::<SendFailurePolicy>().unwrap(),
            SendFailurePolicy::Accept
        );
        assert_eq!(
            "Rollback".parse::<SendFailurePolicy>().unwrap(),
            SendFailurePolicy::Rollback
        );
        assert_eq!(
            "retry:3".parse::<SendFailurePolicy>().unwrap(),
            SendFailurePolicy::Retry { attempts: 3 }
        );
        assert!("retry:x".parse::<SendFailurePolicy>().is_err());
        assert!("ignore".parse::<SendFailurePolicy>().is_err());
    }

    #[test]
    fn test_config_file_overlay() {
        let file = ConfigFile::parse(
            r#"
            endpoints = ["http://a:1", "http://b:2"]
            num_shards = 4
            tps = 50
            cooldown = "90s"
            poll_interval = "5s"
            on_send_failure = "rollback"
            "#,
        )
        .unwrap();

        let config = HarnessConfig::default().apply_file(file).unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.num_shards, 4);
        assert_eq!(config.target_tps, 50);
        assert_eq!(config.cooldown, Duration::from_secs(90));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.send_failure_policy, SendFailurePolicy::Rollback);
    }

    #[test]
    fn test_config_file_rejects_bad_values() {
        assert!(matches!(
            ConfigFile::parse("unknown_key = 1"),
            Err(ConfigError::Parse(_))
        ));

        let file = ConfigFile::parse(r#"cooldown = "soon""#).unwrap();
        assert!(matches!(
            HarnessConfig::default().apply_file(file),
            Err(ConfigError::InvalidDuration(..))
        ));
    }
}
