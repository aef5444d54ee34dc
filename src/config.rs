//! Static configuration tables.
//!
//! Per-chain behavior lives in data, not in match arms scattered through the
//! sync and fee logic: a profile row per supported chain with an explicit
//! default row, and a registry of deployed pool instances per chain and pair.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use web3::types::Address;

use crate::error::{ClientError, Result};
use crate::store::DBConfig;

/// One fixed denomination of one currency. Identifies a single pool
/// instance per network, e.g. `eth-0.1` or `dai-1000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Lowercase ticker, e.g. `eth`.
    pub currency: String,
    /// Decimal denomination as written on the pool, e.g. `0.1`.
    pub amount: String,
}

impl Pair {
    pub fn new(currency: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            amount: amount.into(),
        }
    }

    /// Stable string form used in storage keys and log lines.
    pub fn key(&self) -> String {
        format!("{}-{}", self.currency, self.amount)
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.currency, self.amount)
    }
}

/// Per-chain sync and gas behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainProfile {
    pub chain_id: u64,

    /// Base block-range size for a single `eth_getLogs` call.
    pub max_block_batch_size: u64,

    /// Multiplier applied to the base batch size; tuned per provider limits.
    pub batch_multiplier: u64,

    /// Chain-wide floor for event scans. No pool predates this block.
    pub initial_block: u64,

    /// The chain quotes a fixed gas price; fee quoting uses the average
    /// tier unbumped instead of the fast tier.
    pub fixed_gas_price: bool,

    /// Minimum gas price in gwei enforced by the network, if any.
    pub gas_lower_cap_gwei: Option<u64>,

    /// Consecutive identical block-height observations before the provider
    /// is flagged stuck.
    pub stuck_block_tolerance: u32,

    /// Confirmations required before a receipt counts as settled.
    pub confirmations: u64,
}

/// Fallback profile for chains without a dedicated row.
pub const DEFAULT_CHAIN_PROFILE: ChainProfile = ChainProfile {
    chain_id: 0,
    max_block_batch_size: 10_000,
    batch_multiplier: 1,
    initial_block: 0,
    fixed_gas_price: false,
    gas_lower_cap_gwei: None,
    stuck_block_tolerance: 100,
    confirmations: 4,
};

pub const CHAIN_PROFILES: &[ChainProfile] = &[
    // Ethereum mainnet
    ChainProfile {
        chain_id: 1,
        max_block_batch_size: 50_000,
        batch_multiplier: 2,
        initial_block: 9_100_000,
        fixed_gas_price: false,
        gas_lower_cap_gwei: None,
        stuck_block_tolerance: 100,
        confirmations: 4,
    },
    // Goerli
    ChainProfile {
        chain_id: 5,
        max_block_batch_size: 50_000,
        batch_multiplier: 2,
        initial_block: 3_800_000,
        fixed_gas_price: false,
        gas_lower_cap_gwei: None,
        stuck_block_tolerance: 100,
        confirmations: 4,
    },
    // BNB Smart Chain
    ChainProfile {
        chain_id: 56,
        max_block_batch_size: 5_000,
        batch_multiplier: 1,
        initial_block: 8_000_000,
        fixed_gas_price: true,
        gas_lower_cap_gwei: Some(5),
        stuck_block_tolerance: 100,
        confirmations: 12,
    },
    // Polygon PoS
    ChainProfile {
        chain_id: 137,
        max_block_batch_size: 10_000,
        batch_multiplier: 1,
        initial_block: 16_000_000,
        fixed_gas_price: false,
        gas_lower_cap_gwei: Some(30),
        stuck_block_tolerance: 100,
        confirmations: 64,
    },
    // Avalanche C-Chain caps eth_getLogs at 2048 blocks
    ChainProfile {
        chain_id: 43_114,
        max_block_batch_size: 2_048,
        batch_multiplier: 1,
        initial_block: 4_400_000,
        fixed_gas_price: false,
        gas_lower_cap_gwei: Some(25),
        stuck_block_tolerance: 100,
        confirmations: 4,
    },
    // Arbitrum One
    ChainProfile {
        chain_id: 42_161,
        max_block_batch_size: 100_000,
        batch_multiplier: 10,
        initial_block: 13_000_000,
        fixed_gas_price: false,
        gas_lower_cap_gwei: None,
        stuck_block_tolerance: 100,
        confirmations: 20,
    },
];

/// Look up the profile for a chain, falling back to the default row.
pub fn chain_profile(chain_id: u64) -> &'static ChainProfile {
    CHAIN_PROFILES
        .iter()
        .find(|p| p.chain_id == chain_id)
        .unwrap_or(&DEFAULT_CHAIN_PROFILE)
}

/// A deployed pool contract for one pair on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInstance {
    pub chain_id: u64,
    pub currency: &'static str,
    pub amount: &'static str,
    /// Pool contract address, 0x-prefixed hex.
    pub address: &'static str,
    /// Block the pool contract was deployed in; event scans start here.
    pub deployed_block: u64,
    pub decimals: u32,
    /// Denominated in the chain's native coin rather than a token.
    pub native: bool,
}

impl PoolInstance {
    pub fn pair(&self) -> Pair {
        Pair::new(self.currency, self.amount)
    }

    pub fn contract_address(&self) -> Result<Address> {
        parse_address(self.address)
    }
}

pub const POOLS: &[PoolInstance] = &[
    PoolInstance {
        chain_id: 1,
        currency: "eth",
        amount: "0.1",
        address: "0x12D66f87A04A9E220743712cE6d9bB1B5616B8Fc",
        deployed_block: 9_116_966,
        decimals: 18,
        native: true,
    },
    PoolInstance {
        chain_id: 1,
        currency: "eth",
        amount: "1",
        address: "0x47CE0C6eD5B0Ce3d3A51fdb1C52DC66a7c3c2936",
        deployed_block: 9_117_609,
        decimals: 18,
        native: true,
    },
    PoolInstance {
        chain_id: 1,
        currency: "eth",
        amount: "10",
        address: "0x910Cbd523D972eb0a6f4cAe4618aD62622b39DbF",
        deployed_block: 9_117_720,
        decimals: 18,
        native: true,
    },
    PoolInstance {
        chain_id: 1,
        currency: "eth",
        amount: "100",
        address: "0xA160cdAB225685dA1d56aa342Ad8841c3b53f291",
        deployed_block: 9_161_895,
        decimals: 18,
        native: true,
    },
    PoolInstance {
        chain_id: 1,
        currency: "dai",
        amount: "100",
        address: "0xD4B88Df4D29F5CedD6857912842cff3b20C8Cfa3",
        deployed_block: 9_117_612,
        decimals: 18,
        native: false,
    },
    PoolInstance {
        chain_id: 1,
        currency: "dai",
        amount: "1000",
        address: "0xFD8610d20aA15b7B2E3Be39B396a1bC3516c7144",
        deployed_block: 9_161_895,
        decimals: 18,
        native: false,
    },
    PoolInstance {
        chain_id: 1,
        currency: "usdc",
        amount: "100",
        address: "0xd96f2B1c14Db8458374d9Aca76E26c3D18364307",
        deployed_block: 9_161_895,
        decimals: 6,
        native: false,
    },
    PoolInstance {
        chain_id: 5,
        currency: "eth",
        amount: "0.1",
        address: "0x6Bf694a291DF3FeC1f7e69701E3ab6c592435Ae7",
        deployed_block: 3_782_581,
        decimals: 18,
        native: true,
    },
    PoolInstance {
        chain_id: 5,
        currency: "eth",
        amount: "1",
        address: "0x3aac1cC67c2ec5Db4eA850957b967Ba153aD6279",
        deployed_block: 3_782_590,
        decimals: 18,
        native: true,
    },
];

/// Find the deployed pool for a pair on a chain.
pub fn pool_instance(chain_id: u64, pair: &Pair) -> Result<&'static PoolInstance> {
    POOLS
        .iter()
        .find(|p| p.chain_id == chain_id && p.currency == pair.currency && p.amount == pair.amount)
        .ok_or(ClientError::UnsupportedPool {
            chain_id,
            pair: pair.key(),
        })
}

/// All pools deployed on a chain.
pub fn pools_for_chain(chain_id: u64) -> impl Iterator<Item = &'static PoolInstance> {
    POOLS.iter().filter(move |p| p.chain_id == chain_id)
}

pub fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim_start_matches("0x"))
        .map_err(|_| ClientError::InvalidAddress(raw.to_string()))
}

/// Engine-wide tunables. Chain-specific behavior stays in [`ChainProfile`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db: DBConfig,

    /// Interval between relayer job polls.
    pub job_poll_interval: Duration,

    /// Relayer endpoint name for withdrawal submission, as in
    /// `POST {relayer}/v1/<method>`.
    pub withdraw_method: String,

    /// Confirmations to wait for during receipt enrichment.
    pub receipt_confirmations: u64,

    /// Upper bound on the receipt enrichment wait.
    pub receipt_timeout: Duration,

    /// Broadcast capacity of the engine event bus.
    pub event_bus_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db: DBConfig::default(),
            job_poll_interval: Duration::from_secs(3),
            withdraw_method: "withdraw".to_string(),
            receipt_confirmations: 1,
            receipt_timeout: Duration::from_secs(120),
            event_bus_capacity: 64,
        }
    }
}
