//! Transfer construction for the Sender Loop.

mod transfer;

pub use transfer::TransferWorkload;

use rand::Rng;

/// How much of an account's balance each send moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AmountPolicy {
    /// Always the minimal unit. Maximizes how many sends a balance sustains.
    Minimal,

    /// Uniform in `[1, balance)` to emulate organic usage.
    #[default]
    Randomized,
}

impl AmountPolicy {
    /// Smallest transferable amount, in whole units.
    pub const MINIMAL_UNIT: u64 = 1;

    /// Pick an amount for an account holding `balance`.
    ///
    /// Returns `None` for an empty balance. A balance of exactly one unit
    /// always sends that unit, since `[1, 1)` is empty.
    pub fn pick<R: Rng + ?Sized>(&self, balance: u64, rng: &mut R) -> Option<u64> {
        if balance == 0 {
            return None;
        }
        match self {
            Self::Minimal => Some(Self::MINIMAL_UNIT),
            Self::Randomized if balance <= Self::MINIMAL_UNIT => Some(Self::MINIMAL_UNIT),
            Self::Randomized => Some(rng.gen_range(Self::MINIMAL_UNIT..balance)),
        }
    }
}
