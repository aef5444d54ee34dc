//! Relayer HTTP API client and wire types.

pub mod client;
pub mod errors;
pub mod types;

pub use client::{RelayerApi, RelayerClient};
pub use errors::normalize_relayer_error;
pub use types::{
    RelayerHealth, RelayerJob, RelayerJobStatus, RelayerStatus, WithdrawalSubmission,
};
