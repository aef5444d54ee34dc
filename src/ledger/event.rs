//! Pool event model and raw log decoding.
//!
//! Deposits carry their tree position (`leafIndex`) on chain. Withdrawals do
//! not, so the ledger assigns them a running local index at append time.

use log::warn;
use serde::{Deserialize, Serialize};
use web3::signing::keccak256;
use web3::types::{Address, Log, H256, U256};

/// The two event streams a pool emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deposit,
    Withdrawal,
}

impl EventKind {
    /// Tag byte used in storage keys.
    pub fn tag(self) -> u8 {
        match self {
            EventKind::Deposit => 0x01,
            EventKind::Withdrawal => 0x02,
        }
    }

    /// Solidity event signature emitted by the pool contract.
    pub fn signature(self) -> &'static str {
        match self {
            EventKind::Deposit => "Deposit(bytes32,uint32,uint256)",
            EventKind::Withdrawal => "Withdrawal(address,bytes32,address,uint256)",
        }
    }

    /// topic0 filter value for this event stream.
    pub fn topic0(self) -> H256 {
        H256(keccak256(self.signature().as_bytes()))
    }
}

/// Event-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Deposit {
        commitment_hex: String,
        /// Deposit time as emitted by the contract, unix seconds.
        timestamp: u64,
    },
    Withdrawal {
        to: String,
        nullifier_hex: String,
        /// Relayer fee in pool units, decimal string.
        fee: String,
    },
}

/// One ledger entry. Chain, pair and kind live in the storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEvent {
    /// Gapless per-pair index; the deposit leaf index for deposits.
    pub event_index: u64,
    pub block_number: u64,
    pub transaction_hash: String,
    pub payload: EventPayload,
}

/// Sync position for one (chain, kind, pair) stream. Only ever written
/// together with the events it covers, in the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Block of the last appended event. Re-queried inclusively on the next
    /// sync, with overlap removed via `last_log_index`.
    pub last_queried_block: u64,
    /// Log position of the last appended event within its block.
    pub last_log_index: u64,
    /// Index of the last appended event.
    pub last_event_index: u64,
}

/// A raw log reduced to the fields the ledger stores.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: String,
    /// On-chain leaf index, present for deposits only.
    pub leaf_index: Option<u64>,
    pub payload: EventPayload,
}

pub fn h256_hex(value: &H256) -> String {
    format!("0x{}", hex::encode(value.as_bytes()))
}

pub fn address_hex(value: &Address) -> String {
    format!("0x{}", hex::encode(value.as_bytes()))
}

/// Decode one fetched log. Malformed logs are dropped with a warning; the
/// surrounding sync treats them as absent rather than failing the batch.
pub fn decode_log(kind: EventKind, log: &Log) -> Option<DecodedLog> {
    let block_number = match log.block_number {
        Some(block) => block.as_u64(),
        None => {
            warn!("skipping log without block number");
            return None;
        }
    };
    let log_index = match log.log_index {
        Some(index) => index.low_u64(),
        None => {
            warn!("skipping log without log index");
            return None;
        }
    };
    let transaction_hash = match log.transaction_hash {
        Some(hash) => h256_hex(&hash),
        None => {
            warn!("skipping log without transaction hash");
            return None;
        }
    };

    let data = &log.data.0;
    match kind {
        EventKind::Deposit => {
            // Deposit(bytes32 indexed commitment, uint32 leafIndex, uint256 timestamp)
            if log.topics.len() < 2 || data.len() < 64 {
                warn!("skipping malformed deposit log in block {}", block_number);
                return None;
            }
            let leaf_index = U256::from_big_endian(&data[0..32]).low_u64();
            let timestamp = U256::from_big_endian(&data[32..64]).low_u64();
            Some(DecodedLog {
                block_number,
                log_index,
                transaction_hash,
                leaf_index: Some(leaf_index),
                payload: EventPayload::Deposit {
                    commitment_hex: h256_hex(&log.topics[1]),
                    timestamp,
                },
            })
        }
        EventKind::Withdrawal => {
            // Withdrawal(address to, bytes32 nullifierHash, address indexed relayer, uint256 fee)
            if data.len() < 96 {
                warn!("skipping malformed withdrawal log in block {}", block_number);
                return None;
            }
            let to = Address::from_slice(&data[12..32]);
            let nullifier = H256::from_slice(&data[32..64]);
            let fee = U256::from_big_endian(&data[64..96]);
            Some(DecodedLog {
                block_number,
                log_index,
                transaction_hash,
                leaf_index: None,
                payload: EventPayload::Withdrawal {
                    to: address_hex(&to),
                    nullifier_hex: h256_hex(&nullifier),
                    fee: fee.to_string(),
                },
            })
        }
    }
}
