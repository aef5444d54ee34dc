//! Deposit note model.
//!
//! A note records one fixed-denomination deposit. Only public material is
//! stored here: the nullifier and commitment as hex, never the pre-image.
//! The pre-image stays in the host wallet's encrypted vault and is handed
//! over transiently at proof time.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::config::Pair;

/// Domain tags for derived identifiers.
pub mod domains {
    pub const NOTE_ID: &[u8] = b"pool-client.note.v1";
}

/// Lifecycle of a deposit note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoteStatus {
    /// Deposit transaction sent, not yet settled.
    Pending,
    /// Deposit settled on chain; the note is spendable once unspent.
    Confirmed,
    /// Deposit transaction failed or was never recorded by the wallet.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositNote {
    /// Stable identifier, derived from chain, pair and commitment.
    pub id: String,

    /// Nullifier hash, 0x-prefixed hex.
    pub nullifier_hex: String,

    /// Commitment inserted into the pool tree, 0x-prefixed hex.
    pub commitment_hex: String,

    pub pair: Pair,

    /// Position of the commitment in the pool tree.
    pub deposit_index: u64,

    /// Address the deposit transaction was sent from.
    pub deposit_address: String,

    /// Unix seconds at creation.
    pub timestamp: u64,

    /// Set once the note's nullifier has been revealed by a withdrawal.
    pub spent: bool,

    pub status: NoteStatus,

    pub chain_id: u64,
}

impl DepositNote {
    /// True when the note can back a withdrawal.
    pub fn is_spendable(&self) -> bool {
        !self.spent && self.status == NoteStatus::Confirmed
    }
}

/// Derive the stable note id from chain, pair and commitment.
///
/// # Arguments
/// * `chain_id` - Network the deposit targets
/// * `pair` - Pool denomination
/// * `commitment_hex` - Commitment hex, with or without 0x prefix
///
/// # Returns
/// Hex-encoded 32-byte identifier
pub fn derive_note_id(chain_id: u64, pair: &Pair, commitment_hex: &str) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(domains::NOTE_ID);
    hasher.update(chain_id.to_be_bytes());
    hasher.update(pair.key().as_bytes());
    hasher.update(commitment_hex.trim_start_matches("0x").as_bytes());
    hex::encode(hasher.finalize())
}
