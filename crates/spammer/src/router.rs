//! Outcome Router: bounded hand-off of freshly funded recipient accounts
//! from the Sender Loop to the Confirmation Tracker.
//!
//! The queue is a fixed-capacity channel. When it is full the producer
//! waits; sends are rate-limited far below the default capacity, so a full
//! router means the tracker has stalled and the sender should stall with it
//! rather than grow memory without bound.

use crate::accounts::Account;
use tokio::sync::mpsc;

/// Create a router with room for `capacity` accounts.
pub fn outcome_router(capacity: usize) -> (OutcomeSender, OutcomeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutcomeSender { tx }, OutcomeReceiver { rx })
}

/// Producer half, held by the Sender Loop.
#[derive(Clone, Debug)]
pub struct OutcomeSender {
    tx: mpsc::Sender<Account>,
}

impl OutcomeSender {
    /// Enqueue a recipient account, waiting while the router is full.
    ///
    /// Fails only once the receiving side has been dropped; the account is
    /// handed back in the error.
    pub async fn send(&self, account: Account) -> Result<(), RouterClosed> {
        self.tx
            .send(account)
            .await
            .map_err(|mpsc::error::SendError(account)| RouterClosed(Box::new(account)))
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by the Confirmation Tracker.
#[derive(Debug)]
pub struct OutcomeReceiver {
    rx: mpsc::Receiver<Account>,
}

impl OutcomeReceiver {
    /// Next account, or `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Account> {
        self.rx.recv().await
    }

    /// Take an account if one is ready.
    pub fn try_recv(&mut self) -> Option<Account> {
        self.rx.try_recv().ok()
    }
}

/// The receiving side of the router is gone.
#[derive(Debug, thiserror::Error)]
#[error("Outcome router closed")]
pub struct RouterClosed(pub Box<Account>);
