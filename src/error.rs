//! Error types for the pool client engine.
//!
//! Errors fall into four classes with different handling rules: transport
//! errors are retryable and must never advance persisted state, protocol
//! errors are terminal for the operation that hit them, invariant violations
//! fail fast, and partial-failure states are persisted for reconciliation.

use crate::notes::NoteStatus;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Network-level failure talking to an RPC node or relayer. Retryable;
    /// callers must leave cursors and withdrawal state untouched.
    #[error("transport error: {0}")]
    Transport(String),

    /// The relayer understood the request and rejected it.
    #[error("relayer error: {0}")]
    Relayer(String),

    /// Zero-knowledge proof generation failed.
    #[error("proof generation failed: {0}")]
    Proof(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Token decimals are not configured for the pair. Quoting with a
    /// default would misprice the withdrawal, so this is a hard failure.
    #[error("token decimals not configured for pair {0}")]
    MissingDecimals(String),

    /// The relayer did not quote a price for the pair's token.
    #[error("no price quote for token {0}")]
    MissingPrice(String),

    #[error("no pool deployed for pair {pair} on chain {chain_id}")]
    UnsupportedPool { chain_id: u64, pair: String },

    /// The relayer reports a different network than the withdrawal targets.
    #[error("relayer serves chain {relayer} but the withdrawal targets chain {expected}")]
    RelayerNetworkMismatch { relayer: u64, expected: u64 },

    /// A fetched deposit event skipped over an index. The on-chain tree is
    /// append-only, so a gap means the node served an incomplete range.
    #[error("event index gap for pair {pair}: expected {expected}, got {got}")]
    EventIndexGap { pair: String, expected: u64, got: u64 },

    /// The requested note is spent or not yet confirmed.
    #[error("note {0} is not spendable (status {1:?})")]
    NoteNotWithdrawable(String, NoteStatus),

    #[error("no unspent confirmed note available for the pair")]
    NoSpendableNote,

    #[error("invalid amount {0:?}: {1}")]
    InvalidAmount(String, String),

    #[error("invalid service fee percent {0}")]
    InvalidFeePercent(f64),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// True for failures that should be retried without recording anything.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

impl From<web3::Error> for ClientError {
    fn from(err: web3::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}
