//! Proof generation seam.
//!
//! The proving system lives outside this crate. The engine hands over the
//! note pre-image and the public inputs and gets back an opaque proof plus
//! the argument vector the pool contract expects.

use async_trait::async_trait;

use crate::config::Pair;
use crate::error::Result;

/// Secret note material, reconstructed transiently at proof time. Never
/// persisted by this crate.
#[derive(Debug, Clone)]
pub struct ParsedNote {
    pub currency: String,
    pub amount: String,
    pub chain_id: u64,
    /// Nullifier and blinding pre-image, hex.
    pub preimage_hex: String,
}

/// Proof and public inputs ready for relayer submission.
#[derive(Debug, Clone)]
pub struct ProofBundle {
    /// Serialized proof, 0x-prefixed hex.
    pub proof: String,
    /// Public inputs in contract argument order, each 0x-prefixed hex.
    pub args: Vec<String>,
}

#[async_trait]
pub trait ProofGenerator: Send + Sync {
    /// Build a withdrawal proof for `note` paying out to `recipient`, with
    /// `fee` (smallest pair units, decimal string) accruing to
    /// `reward_account`.
    async fn generate_proof(
        &self,
        pair: &Pair,
        note: &ParsedNote,
        recipient: &str,
        reward_account: &str,
        fee: &str,
    ) -> Result<ProofBundle>;
}
