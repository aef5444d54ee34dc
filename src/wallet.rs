//! Host wallet collaborator seams.
//!
//! The engine never holds keys or transaction history itself. It asks the
//! host for unlock state, the active network, per-deposit transaction
//! verdicts and the secret note material derived from the wallet seed.

use async_trait::async_trait;

use crate::config::Pair;
use crate::error::Result;
use crate::notes::DepositNote;
use crate::prover::ParsedNote;

/// Unlock state and active network of the host wallet.
pub trait WalletContext: Send + Sync {
    fn is_unlocked(&self) -> bool;
    fn active_chain_id(&self) -> u64;
}

/// What the wallet's own transaction store says about a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionVerdict {
    /// The transaction is known and still unconfirmed.
    Pending,
    Confirmed,
    Failed,
}

pub trait TransactionRecords: Send + Sync {
    /// Verdict for the transaction that carried this deposit, or `None`
    /// when the wallet has no record of it at all.
    fn deposit_verdict(&self, chain_id: u64, deposit_id: &str) -> Option<TransactionVerdict>;
}

/// Public fields of a freshly derived note.
#[derive(Debug, Clone)]
pub struct DerivedNote {
    pub nullifier_hex: String,
    pub commitment_hex: String,
    pub deposit_address: String,
}

/// Access to seed-derived note material in the host's encrypted vault.
#[async_trait]
pub trait NoteSecrets: Send + Sync {
    /// Derive the note for the pair's next tree position. Derivation is
    /// deterministic in `index`, which is why callers serialize the whole
    /// derive-and-record sequence.
    async fn derive_note(&self, chain_id: u64, pair: &Pair, index: u64) -> Result<DerivedNote>;

    /// Reconstruct the secret pre-image backing a stored note.
    async fn reveal_note(&self, note: &DepositNote) -> Result<ParsedNote>;
}
