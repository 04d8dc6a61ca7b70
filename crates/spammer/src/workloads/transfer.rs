//! Same-shard transfer workload generator.

use crate::accounts::Account;
use crate::config::DEFAULT_DENOMINATION;
use crate::workloads::AmountPolicy;
use loadgen_types::{KeyError, KeyPair, ShardId, SignedTransfer, Transfer};
use rand::Rng;

/// Builds signed transfers from pool accounts to freshly generated
/// recipients on the sender's shard.
#[derive(Clone, Debug)]
pub struct TransferWorkload {
    /// Number of shards, for recipient key search.
    num_shards: u64,

    /// Amount selection policy.
    policy: AmountPolicy,

    /// Fee attached to every transfer, in base units.
    fee: u64,

    /// Base units per whole unit.
    denomination: u64,
}

impl TransferWorkload {
    /// Create a new transfer workload generator.
    pub fn new(num_shards: u64) -> Self {
        Self {
            num_shards,
            policy: AmountPolicy::default(),
            fee: 0,
            denomination: DEFAULT_DENOMINATION,
        }
    }

    /// Set the amount policy.
    pub fn with_policy(mut self, policy: AmountPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the fee in base units.
    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Set base units per whole unit.
    pub fn with_denomination(mut self, denomination: u64) -> Self {
        self.denomination = denomination.max(1);
        self
    }

    pub fn policy(&self) -> AmountPolicy {
        self.policy
    }

    /// Amount (whole units) to move out of `account` on this send.
    pub fn amount_for<R: Rng + ?Sized>(&self, account: &Account, rng: &mut R) -> Option<u64> {
        self.policy.pick(account.balance(), rng)
    }

    /// Fresh recipient key on `shard`.
    pub fn recipient_for<R: Rng + ?Sized>(
        &self,
        shard: ShardId,
        rng: &mut R,
    ) -> Result<KeyPair, KeyError> {
        KeyPair::generate_on_shard(shard, self.num_shards, rng)
    }

    /// Build and sign a transfer of `amount` whole units from `from` to
    /// `recipient` using `nonce`.
    pub fn build(
        &self,
        from: &Account,
        recipient: &KeyPair,
        amount: u64,
        nonce: u64,
    ) -> SignedTransfer {
        Transfer {
            from: from.address,
            to: recipient.address(),
            amount: amount.saturating_mul(self.denomination),
            fee: self.fee,
            nonce,
            payload: Vec::new(),
        }
        .sign(&from.keypair)
    }
}
