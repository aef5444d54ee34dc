//! Chain access: RPC seam, gas price shapes and gas floor handling.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use web3::transports::Http;
use web3::types::{Filter, Transaction, TransactionId, TransactionReceipt, H256, U256};
use web3::Web3;

use crate::error::{ClientError, Result};

/// Gas price for one tier, in the shape the source quoted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GasPrice {
    #[serde(rename_all = "camelCase")]
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
    #[serde(rename_all = "camelCase")]
    Legacy { gas_price: U256 },
}

impl GasPrice {
    /// The price a transaction at this tier would pay per gas unit.
    pub fn effective_price(&self) -> U256 {
        match self {
            GasPrice::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
            GasPrice::Legacy { gas_price } => *gas_price,
        }
    }

    /// Raise the effective price to at least `floor`.
    pub fn clamped_to_min(self, floor: U256) -> GasPrice {
        match self {
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => GasPrice::Eip1559 {
                max_fee_per_gas: max_fee_per_gas.max(floor),
                max_priority_fee_per_gas,
            },
            GasPrice::Legacy { gas_price } => GasPrice::Legacy {
                gas_price: gas_price.max(floor),
            },
        }
    }
}

/// The three quoted tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceLevels {
    pub slow: GasPrice,
    pub average: GasPrice,
    pub fast: GasPrice,
}

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

/// Error for a quoted price so large the fee math cannot hold it. Gas
/// tiers come off the wire, so degenerate values must surface as errors,
/// never as aborts.
pub(crate) fn gas_price_out_of_range(price: U256) -> ClientError {
    ClientError::InvalidAmount(price.to_string(), "quoted gas price out of range".to_string())
}

/// Enforce a network gas floor on quoted tiers: every tier at least the
/// cap, and every higher tier at least 1.25x the tier below it, so the
/// tiers stay strictly ordered after clamping. A tier quoted at the
/// integer ceiling cannot be stepped and is rejected.
pub fn apply_gas_lower_cap(levels: GasPriceLevels, cap_gwei: u64) -> Result<GasPriceLevels> {
    let cap = gwei(cap_gwei);
    let slow = levels.slow.clamped_to_min(cap);
    let average = levels
        .average
        .clamped_to_min(tier_step(slow.effective_price())?);
    let fast = levels
        .fast
        .clamped_to_min(tier_step(average.effective_price())?);
    Ok(GasPriceLevels { slow, average, fast })
}

/// 1.25x the tier below, the margin that keeps clamped tiers ordered.
fn tier_step(price: U256) -> Result<U256> {
    Ok(price
        .checked_mul(U256::from(5))
        .ok_or_else(|| gas_price_out_of_range(price))?
        / U256::from(4))
}

/// Source of gas price tiers, supplied by the host wallet.
#[async_trait]
pub trait GasPriceSource: Send + Sync {
    async fn get_gas_price_levels(&self, chain_id: u64) -> Result<GasPriceLevels>;
}

/// Chain RPC operations the engine consumes.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn get_logs(&self, filter: Filter) -> Result<Vec<web3::types::Log>>;

    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>>;

    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;

    /// Wait until the transaction has the requested confirmations, or give
    /// up after `timeout`. `Ok(None)` means the wait timed out.
    async fn wait_for_transaction(
        &self,
        hash: H256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>>;
}

/// `ChainRpc` over an HTTP JSON-RPC endpoint.
pub struct Web3ChainRpc {
    web3: Web3<Http>,
}

impl Web3ChainRpc {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let transport = Http::new(rpc_url)?;
        Ok(Self {
            web3: Web3::new(transport),
        })
    }
}

#[async_trait]
impl ChainRpc for Web3ChainRpc {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.web3.eth().block_number().await?.as_u64())
    }

    async fn get_logs(&self, filter: Filter) -> Result<Vec<web3::types::Log>> {
        Ok(self.web3.eth().logs(filter).await?)
    }

    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>> {
        Ok(self.web3.eth().transaction(TransactionId::Hash(hash)).await?)
    }

    async fn get_transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.web3.eth().transaction_receipt(hash).await?)
    }

    async fn wait_for_transaction(
        &self,
        hash: H256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>> {
        let started = Instant::now();
        loop {
            if let Some(receipt) = self.get_transaction_receipt(hash).await? {
                if let Some(mined_in) = receipt.block_number {
                    let head = self.block_number().await?;
                    if head.saturating_sub(mined_in.as_u64()) + 1 >= confirmations {
                        return Ok(Some(receipt));
                    }
                }
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
