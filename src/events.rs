//! Engine event bus.
//!
//! The host wallet subscribes to re-render balances and withdrawal progress.
//! Delivery is broadcast, best effort: emitting with no subscribers is fine,
//! and a slow subscriber only lags its own receiver.

use tokio::sync::broadcast;

use crate::withdraw::WithdrawalStatus;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A pending withdrawal changed state. Fired on submission acceptance
    /// and on every terminal transition.
    WithdrawalStateChange {
        chain_id: u64,
        pending_id: String,
        status: WithdrawalStatus,
    },

    /// The deposit note set for a chain changed.
    DepositsChanged { chain_id: u64 },

    /// The block source reported the same height too many times in a row.
    ProviderStuck { chain_id: u64, block: u64 },

    /// A note reconstruction pass was found interrupted at unlock.
    ReconstructionInterrupted { chain_id: u64 },
}

/// Cheap-to-clone handle on the broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Lack of subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
