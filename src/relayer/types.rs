//! Wire types of the relayer HTTP API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use web3::types::U256;

/// Body of `POST /v1/<method>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalSubmission {
    /// Pool contract address, 0x-prefixed hex.
    pub contract: String,
    /// Serialized proof, 0x-prefixed hex.
    pub proof: String,
    /// Public inputs, each 0x-prefixed hex, in contract argument order.
    pub args: Vec<String>,
}

/// Response of a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreated {
    pub id: String,
}

/// Relayer-side lifecycle of one submitted withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayerJobStatus {
    Queued,
    Accepted,
    Sent,
    Resubmitted,
    Mined,
    Confirmed,
    Failed,
    Rejected,
    /// Forward compatibility with statuses this client does not know.
    #[serde(other)]
    Unknown,
}

impl RelayerJobStatus {
    /// The relayer will not change this job again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelayerJobStatus::Mined
                | RelayerJobStatus::Confirmed
                | RelayerJobStatus::Failed
                | RelayerJobStatus::Rejected
        )
    }

    /// Terminal and the withdrawal landed on chain.
    pub fn is_success(self) -> bool {
        matches!(self, RelayerJobStatus::Mined | RelayerJobStatus::Confirmed)
    }
}

/// Response of `GET /v1/jobs/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerJob {
    pub status: RelayerJobStatus,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerHealth {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /status`: the relayer's operational self-description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerStatus {
    /// Account the service fee accrues to; a public proof input.
    pub reward_account: String,
    /// Chain the relayer submits to.
    pub net_id: u64,
    /// Service fee in percent, e.g. 0.5.
    pub service_fee_percent: f64,
    /// Token prices in native wei per whole token, keyed by ticker.
    #[serde(default)]
    pub eth_prices: HashMap<String, String>,
    #[serde(default)]
    pub health: Option<RelayerHealth>,
    #[serde(default)]
    pub version: Option<String>,
}

impl RelayerStatus {
    /// A relayer that reports no health block is assumed live; one that
    /// does must say so explicitly.
    pub fn is_healthy(&self) -> bool {
        match &self.health {
            None => true,
            Some(h) => h.status == "true" || h.status.eq_ignore_ascii_case("ok"),
        }
    }

    /// Quoted price for a token, if present and parseable.
    pub fn token_price_wei(&self, currency: &str) -> Option<U256> {
        self.eth_prices
            .get(currency)
            .and_then(|raw| U256::from_dec_str(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_parses_wire_casing() {
        let job: RelayerJob = serde_json::from_str(
            r#"{"status":"CONFIRMED","txHash":"0xabc","failedReason":null}"#,
        )
        .unwrap();
        assert_eq!(job.status, RelayerJobStatus::Confirmed);
        assert_eq!(job.tx_hash.as_deref(), Some("0xabc"));
        assert!(job.status.is_terminal());
        assert!(job.status.is_success());
    }

    #[test]
    fn unknown_job_status_is_tolerated() {
        let job: RelayerJob = serde_json::from_str(r#"{"status":"SIMULATING"}"#).unwrap();
        assert_eq!(job.status, RelayerJobStatus::Unknown);
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn failed_and_rejected_are_terminal_failures() {
        for status in [RelayerJobStatus::Failed, RelayerJobStatus::Rejected] {
            assert!(status.is_terminal());
            assert!(!status.is_success());
        }
        assert!(!RelayerJobStatus::Sent.is_terminal());
    }

    #[test]
    fn status_payload_parses() {
        let status: RelayerStatus = serde_json::from_str(
            r#"{
                "rewardAccount": "0x0000000000000000000000000000000000000009",
                "netId": 1,
                "serviceFeePercent": 0.5,
                "ethPrices": {"dai": "554462131463668", "usdc": "554462131463668"},
                "health": {"status": "true", "error": ""}
            }"#,
        )
        .unwrap();

        assert!(status.is_healthy());
        assert_eq!(status.net_id, 1);
        assert_eq!(
            status.token_price_wei("dai"),
            Some(U256::from_dec_str("554462131463668").unwrap())
        );
        assert_eq!(status.token_price_wei("mist"), None);
    }

    #[test]
    fn unhealthy_relayer_is_detected() {
        let status: RelayerStatus = serde_json::from_str(
            r#"{
                "rewardAccount": "0x0000000000000000000000000000000000000009",
                "netId": 1,
                "serviceFeePercent": 0.5,
                "health": {"status": "false", "error": "out of sync"}
            }"#,
        )
        .unwrap();
        assert!(!status.is_healthy());
    }
}
