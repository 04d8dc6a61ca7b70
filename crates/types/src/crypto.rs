//! Ed25519 key pairs for signing transfers.

use crate::hash::strip_hex_prefix;
use crate::{Address, ShardId};
use ed25519_dalek::{Signer, Verifier};
use rand::RngCore;
use std::fmt;

/// Length of a private key seed in bytes.
pub const SEED_BYTES: usize = 32;

/// Length of a public key in bytes.
pub const PUBLIC_KEY_BYTES: usize = 32;

/// Length of a signature in bytes.
pub const SIGNATURE_BYTES: usize = 64;

/// Attempts per shard before `generate_on_shard` gives up.
const SHARD_SEARCH_ATTEMPTS_PER_SHARD: u64 = 64;

/// A signing key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Build a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_BYTES]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded seed (optional `0x` prefix, surrounding whitespace ignored).
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = strip_hex_prefix(hex);
        if hex.len() != SEED_BYTES * 2 {
            return Err(KeyError::InvalidLength {
                expected: SEED_BYTES * 2,
                actual: hex.len(),
            });
        }
        let mut seed = [0u8; SEED_BYTES];
        hex::decode_to_slice(hex, &mut seed).map_err(|_| KeyError::InvalidHex)?;
        Ok(Self::from_seed(&seed))
    }

    /// Hex-encoded seed, the format accepted by [`KeyPair::from_hex`].
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Generate a fresh key pair from the given randomness source.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut seed = [0u8; SEED_BYTES];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Generate a fresh key pair whose address lands on `shard`.
    ///
    /// Draws seeds until one matches. Each draw hits with probability
    /// `1 / num_shards`, so the search is bounded rather than exhaustive.
    pub fn generate_on_shard<R: RngCore + ?Sized>(
        shard: ShardId,
        num_shards: u64,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        let num_shards = num_shards.max(1);
        if shard.0 >= num_shards {
            return Err(KeyError::ShardOutOfRange { shard, num_shards });
        }

        let attempts = num_shards.saturating_mul(SHARD_SEARCH_ATTEMPTS_PER_SHARD);
        for _ in 0..attempts {
            let candidate = Self::generate(rng);
            if candidate.address().shard(num_shards) == shard {
                return Ok(candidate);
            }
        }

        Err(KeyError::ShardSearchExhausted { shard, attempts })
    }

    /// Get the public key bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_BYTES] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The address owned by this key.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_BYTES] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature against a public key.
pub(crate) fn verify(
    public_key: &[u8; PUBLIC_KEY_BYTES],
    message: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(pk) = ed25519_dalek::VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(sig_array) = <[u8; SIGNATURE_BYTES]>::try_from(signature) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
    pk.verify(message, &sig).is_ok()
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Errors from key parsing and generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected} hex chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid hex in key")]
    InvalidHex,

    #[error("Shard {shard} is out of range for {num_shards} shards")]
    ShardOutOfRange { shard: ShardId, num_shards: u64 },

    #[error("No key found for shard {shard} after {attempts} attempts")]
    ShardSearchExhausted { shard: ShardId, attempts: u64 },
}
