//! Ledger Load Generator
//!
//! A library and CLI tool that drives transfers against a sharded ledger at a
//! capped rate and follows each one until it is included and confirmed.
//!
//! # Modules
//!
//! - [`accounts`]: Account management (Account, AccountPool)
//! - [`client`]: RPC access (LedgerClient trait, ShardClients routing, JsonRpcClient)
//! - [`workloads`]: Amount policy and transfer construction
//! - [`router`]: Outcome Router between the sender and the tracker
//! - [`runner`]: Sender Loop, rate limiter and the Harness orchestrator
//! - [`tracker`]: Confirmation Tracker
//! - [`latency`]: Inclusion latency histogram
//! - [`bootstrap`]: Key file loading and pool seeding
//! - [`config`]: Configuration types

pub mod accounts;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod latency;
pub mod router;
pub mod runner;
pub mod tracker;
pub mod workloads;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use accounts::{Account, AccountPool};
pub use bootstrap::BootstrapError;
pub use client::{ClientError, JsonRpcClient, LedgerClient, RpcError, ShardClients, TxStatus};
pub use config::{ConfigError, ConfigFile, HarnessConfig, SendFailurePolicy};
pub use latency::{LatencyRecorder, LatencyReport};
pub use runner::{Harness, HarnessError, HarnessReport, SenderLoop, SenderReport};
pub use tracker::{ConfirmationTracker, TrackerReport};
pub use workloads::{AmountPolicy, TransferWorkload};
