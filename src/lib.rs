//! Client-side engine of a non-custodial privacy pool.
//!
//! The engine runs inside a host wallet and owns the private state a pool
//! user accumulates: deposit notes, a local cache of on-chain pool events,
//! and the lifecycle of relayed withdrawals. It holds no keys and sends no
//! transactions; signing, proving and network selection stay with the host
//! behind the traits in [`wallet`], [`prover`] and [`chain`].
//!
//! Everything that must survive a crash lives in RocksDB and is repaired at
//! startup by [`reconcile::ReconciliationScheduler`].

// Engine core
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;

// Domain state
pub mod ledger;
pub mod notes;
pub mod withdraw;

// Pipelines
pub mod deposit;
pub mod fees;
pub mod reconcile;

// Host and network seams
pub mod chain;
pub mod prover;
pub mod relayer;
pub mod wallet;

// Re-export the surface a host wallet wires against
pub use chain::{ChainRpc, GasPrice, GasPriceLevels, GasPriceSource, Web3ChainRpc};
pub use config::{ChainProfile, EngineConfig, Pair, PoolInstance};
pub use deposit::DepositCoordinator;
pub use engine::{Collaborators, PrivacyPoolEngine};
pub use error::{ClientError, Result};
pub use events::{EngineEvent, EventBus};
pub use fees::FeeQuote;
pub use ledger::{EventKind, EventLedger, PoolEvent};
pub use notes::{DepositNote, NoteStatus, NoteVault};
pub use prover::{ParsedNote, ProofBundle, ProofGenerator};
pub use reconcile::ReconciliationScheduler;
pub use relayer::{RelayerApi, RelayerClient};
pub use wallet::{NoteSecrets, TransactionRecords, TransactionVerdict, WalletContext};
pub use withdraw::{PendingWithdrawal, WithdrawRequest, WithdrawalCoordinator, WithdrawalStatus};
