//! Persisted withdrawal records.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::Pair;

/// Lifecycle of a relayed withdrawal.
///
/// `Unsubmitted` exists only between record creation and relayer acceptance;
/// a restart that finds one proves the submission was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WithdrawalStatus {
    Unsubmitted,
    Pending,
    Confirmed,
    Mined,
    Failed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Confirmed
                | WithdrawalStatus::Mined
                | WithdrawalStatus::Failed
                | WithdrawalStatus::Rejected
        )
    }

    /// Both `Confirmed` and `Mined` mean the funds left the pool.
    pub fn is_success(&self) -> bool {
        matches!(self, WithdrawalStatus::Confirmed | WithdrawalStatus::Mined)
    }
}

/// One withdrawal attempt, persisted from creation until the host prunes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    /// Local identifier, random per attempt.
    pub pending_id: String,
    /// Note being spent.
    pub deposit_id: String,
    pub pair: Pair,
    pub to_address: String,
    pub relayer_url: String,
    /// Job handle returned by the relayer, absent until acceptance.
    pub job_id: Option<String>,
    pub status: WithdrawalStatus,
    /// Creation time, seconds since the epoch.
    pub time: u64,
    /// Total relayer fee in token base units, rendered as decimal.
    pub fee: Option<String>,
    pub chain_id: u64,
    pub transaction_hash: Option<String>,
    /// Receipt captured after mining; best effort, may stay empty.
    pub transaction_receipt: Option<web3::types::TransactionReceipt>,
    pub err_message: Option<String>,
    /// Human-readable progress detail, e.g. the decoded contract method.
    pub status_message: Option<String>,
}

impl PendingWithdrawal {
    pub fn new(
        chain_id: u64,
        pair: Pair,
        deposit_id: String,
        to_address: String,
        relayer_url: String,
        fee: Option<String>,
    ) -> Self {
        PendingWithdrawal {
            pending_id: fresh_pending_id(),
            deposit_id,
            pair,
            to_address,
            relayer_url,
            job_id: None,
            status: WithdrawalStatus::Unsubmitted,
            time: now_secs(),
            fee,
            chain_id,
            transaction_hash: None,
            transaction_receipt: None,
            err_message: None,
            status_message: None,
        }
    }
}

fn fresh_pending_id() -> String {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PendingWithdrawal {
        PendingWithdrawal::new(
            1,
            Pair::new("eth", "0.1"),
            "note-1".into(),
            "0x000000000000000000000000000000000000dead".into(),
            "https://relayer.example".into(),
            Some("1000000000000000".into()),
        )
    }

    #[test]
    fn new_records_start_unsubmitted() {
        let record = sample();
        assert_eq!(record.status, WithdrawalStatus::Unsubmitted);
        assert!(record.job_id.is_none());
        assert!(record.transaction_hash.is_none());
        assert_eq!(record.pending_id.len(), 32);
    }

    #[test]
    fn pending_ids_are_unique() {
        let a = sample();
        let b = sample();
        assert_ne!(a.pending_id, b.pending_id);
    }

    #[test]
    fn terminal_and_success_partitions() {
        use WithdrawalStatus::*;
        for status in [Unsubmitted, Pending] {
            assert!(!status.is_terminal());
            assert!(!status.is_success());
        }
        for status in [Confirmed, Mined] {
            assert!(status.is_terminal());
            assert!(status.is_success());
        }
        for status in [Failed, Rejected] {
            assert!(status.is_terminal());
            assert!(!status.is_success());
        }
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&WithdrawalStatus::Unsubmitted).unwrap();
        assert_eq!(json, "\"UNSUBMITTED\"");
        let back: WithdrawalStatus = serde_json::from_str("\"MINED\"").unwrap();
        assert_eq!(back, WithdrawalStatus::Mined);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = sample();
        record.status = WithdrawalStatus::Pending;
        record.job_id = Some("job-7".into());
        let json = serde_json::to_vec(&record).unwrap();
        let back: PendingWithdrawal = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.pending_id, record.pending_id);
        assert_eq!(back.status, WithdrawalStatus::Pending);
        assert_eq!(back.job_id.as_deref(), Some("job-7"));
    }
}
