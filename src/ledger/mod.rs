//! Local cache of on-chain pool events with incremental sync.

pub mod event;
pub mod sync;

pub use event::{EventKind, EventPayload, PoolEvent, SyncCursor};
pub use sync::{EventLedger, SyncOutcome};
