//! Core types for the load generation harness.
//!
//! This crate provides the ledger-facing primitives the harness works with:
//!
//! - **Identifiers**: ShardId
//! - **Primitives**: TxHash, Address, Ed25519 key pairs and signatures
//! - **Transfers**: Transfer and SignedTransfer, the only transaction kind the harness emits
//! - **Routing**: `shard_for_address`, the pure address-to-shard function
//!
//! # Design Philosophy
//!
//! This crate is self-contained. It does not depend on any other workspace
//! crates and knows nothing about RPC transport, making it the foundation layer.

mod address;
mod crypto;
mod hash;
mod identifiers;
mod topology;
mod transaction;

pub use address::Address;
pub use crypto::{KeyError, KeyPair, PUBLIC_KEY_BYTES, SEED_BYTES, SIGNATURE_BYTES};
pub use hash::{HexError, TxHash};
pub use identifiers::ShardId;
pub use topology::shard_for_address;
pub use transaction::{SignedTransfer, Transfer};
