//! Relayed withdrawal pipeline.
//!
//! A withdrawal moves through a persisted state machine: created
//! `UNSUBMITTED`, flipped to `PENDING` once the relayer accepts the job,
//! then driven by polling to exactly one terminal state. Every record
//! survives restarts; interrupted ones are repaired at boot by the
//! reconciliation pass.

pub mod coordinator;
pub mod queue;
pub mod record;

pub use coordinator::{WithdrawRequest, WithdrawalCoordinator};
pub use queue::{WithdrawalQueue, WithdrawalQueueLock};
pub use record::{PendingWithdrawal, WithdrawalStatus};
