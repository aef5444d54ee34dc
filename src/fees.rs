//! Withdrawal fee quoting.
//!
//! A quote blends the relayer's service fee with the projected gas cost of
//! the withdrawal transaction. All arithmetic is integer-exact in the pair's
//! smallest unit; the only float input is the relayer's quoted percentage,
//! which is scaled by its own decimal precision before any multiplication.

use web3::types::U256;

use crate::chain::{gas_price_out_of_range, gwei, GasPrice, GasPriceLevels};
use crate::config::{ChainProfile, Pair};
use crate::error::{ClientError, Result};

/// Gas limit of a pool withdrawal transaction.
pub const WITHDRAWAL_GAS_LIMIT: u64 = 550_000;

/// Gas limit of a pool deposit transaction. Inserting a commitment rebuilds
/// a full tree path on chain, which outweighs the withdrawal's proof check.
pub const DEPOSIT_GAS_LIMIT: u64 = 600_000;

/// Fast-tier bump applied on legacy chains, in percent.
const GAS_PRICE_BUMP_PERCENT: u64 = 5;

/// Floor of the fast-tier bump, in gwei.
const MIN_GAS_PRICE_BUMP_GWEI: u64 = 3;

/// Most fractional digits accepted in a quoted percentage. Finer quotes
/// scale past what 18-decimal amounts can resolve.
const MAX_FEE_PERCENT_PLACES: usize = 18;

const NATIVE_DECIMALS: u32 = 18;

/// Token facts needed to quote a non-native pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenQuote {
    /// Token decimals, if configured.
    pub decimals: Option<u32>,
    /// Price of one whole token in native wei, if the relayer quoted one.
    pub price_wei: Option<U256>,
}

/// Ephemeral quote, all amounts in the pair's smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Denomination of the pair.
    pub total: U256,
    /// What the relayer keeps: gas cost plus service fee.
    pub fee: U256,
    /// Projected gas cost of the withdrawal transaction.
    pub gas_cost: U256,
    /// Relayer service fee portion.
    pub fee_percent: U256,
    pub decimals: u32,
}

/// Gas price a relayed withdrawal should offer.
///
/// Chains with a fixed gas price take the average tier as quoted. On
/// EIP-1559 chains the fast tier's max fee already prices urgency. Legacy
/// chains get the fast tier bumped by 5%, floored at 3 gwei, so the relayer
/// transaction does not idle behind the tier it was quoted from. A tier
/// quoted beyond what the bump can multiply is rejected.
pub fn select_withdrawal_gas_price(profile: &ChainProfile, levels: &GasPriceLevels) -> Result<U256> {
    if profile.fixed_gas_price {
        return Ok(levels.average.effective_price());
    }
    match levels.fast {
        GasPrice::Eip1559 { max_fee_per_gas, .. } => Ok(max_fee_per_gas),
        GasPrice::Legacy { gas_price } => {
            let bump = gas_price
                .checked_mul(U256::from(GAS_PRICE_BUMP_PERCENT))
                .ok_or_else(|| gas_price_out_of_range(gas_price))?
                / U256::from(100);
            gas_price
                .checked_add(bump.max(gwei(MIN_GAS_PRICE_BUMP_GWEI)))
                .ok_or_else(|| gas_price_out_of_range(gas_price))
        }
    }
}

/// Projected native cost of a deposit at the same gas price policy.
pub fn estimate_deposit_gas_cost(profile: &ChainProfile, levels: &GasPriceLevels) -> Result<U256> {
    let gas_price = select_withdrawal_gas_price(profile, levels)?;
    gas_price
        .checked_mul(U256::from(DEPOSIT_GAS_LIMIT))
        .ok_or_else(|| gas_price_out_of_range(gas_price))
}

/// Parse a decimal amount string into smallest units.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256> {
    let amount = amount.trim();
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ClientError::InvalidAmount(
            amount.to_string(),
            "empty amount".to_string(),
        ));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ClientError::InvalidAmount(
            amount.to_string(),
            "not a decimal number".to_string(),
        ));
    }
    if frac_part.len() > decimals as usize {
        return Err(ClientError::InvalidAmount(
            amount.to_string(),
            format!("more than {} decimal places", decimals),
        ));
    }

    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in 0..(decimals as usize - frac_part.len()) {
        digits.push('0');
    }
    if digits.chars().all(|c| c == '0') {
        return Ok(U256::zero());
    }

    U256::from_dec_str(&digits).map_err(|_| {
        ClientError::InvalidAmount(amount.to_string(), "amount out of range".to_string())
    })
}

/// The service-fee portion of `total` at the quoted percentage.
///
/// The percentage is scaled by exactly as many decimal places as it
/// carries: 0.5% of x is `x * 5 / 1000`, 0.05% is `x * 5 / 10000`. No
/// float enters the multiplication. A quote outside 0..=100 percent, or
/// carrying more than 18 fractional digits, is rejected rather than
/// scaled.
pub fn service_fee_portion(total: U256, percent: f64) -> Result<U256> {
    if !percent.is_finite() || percent < 0.0 || percent > 100.0 {
        return Err(ClientError::InvalidFeePercent(percent));
    }

    // shortest decimal rendering that round-trips the float
    let rendered = format!("{}", percent);
    let (scaled_digits, places) = match rendered.split_once('.') {
        Some((int, frac)) => (format!("{}{}", int, frac), frac.len()),
        None => (rendered, 0),
    };
    if places > MAX_FEE_PERCENT_PLACES {
        return Err(ClientError::InvalidFeePercent(percent));
    }
    let scaled = U256::from_dec_str(&scaled_digits)
        .map_err(|_| ClientError::InvalidFeePercent(percent))?;
    let divisor = U256::exp10(places) * U256::from(100);

    let product = total
        .checked_mul(scaled)
        .ok_or(ClientError::InvalidFeePercent(percent))?;
    Ok(product / divisor)
}

/// Quote the fee and total for withdrawing one pair denomination.
///
/// `token` is `None` for native pairs. Token pairs convert the gas cost
/// into token units through the relayer's price quote; a missing decimals
/// configuration or price is a hard error, never a silent default.
pub fn calculate_fee_and_total(
    profile: &ChainProfile,
    pair: &Pair,
    service_fee_percent: f64,
    levels: &GasPriceLevels,
    token: Option<&TokenQuote>,
) -> Result<FeeQuote> {
    let gas_price = select_withdrawal_gas_price(profile, levels)?;
    let gas_cost_wei = gas_price
        .checked_mul(U256::from(WITHDRAWAL_GAS_LIMIT))
        .ok_or_else(|| gas_price_out_of_range(gas_price))?;

    let decimals = match token {
        None => NATIVE_DECIMALS,
        Some(quote) => quote
            .decimals
            .ok_or_else(|| ClientError::MissingDecimals(pair.key()))?,
    };

    let total = parse_units(&pair.amount, decimals)?;
    let fee_percent = service_fee_portion(total, service_fee_percent)?;

    let gas_cost = match token {
        None => gas_cost_wei,
        Some(quote) => {
            let price_wei = quote
                .price_wei
                .filter(|p| !p.is_zero())
                .ok_or_else(|| ClientError::MissingPrice(pair.currency.clone()))?;
            gas_cost_wei
                .checked_mul(U256::exp10(decimals as usize))
                .ok_or_else(|| gas_price_out_of_range(gas_price))?
                / price_wei
        }
    };

    let fee = gas_cost
        .checked_add(fee_percent)
        .ok_or_else(|| gas_price_out_of_range(gas_price))?;
    Ok(FeeQuote {
        total,
        fee,
        gas_cost,
        fee_percent,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CHAIN_PROFILE;

    fn legacy_levels(slow: u64, average: u64, fast: u64) -> GasPriceLevels {
        GasPriceLevels {
            slow: GasPrice::Legacy { gas_price: gwei(slow) },
            average: GasPrice::Legacy { gas_price: gwei(average) },
            fast: GasPrice::Legacy { gas_price: gwei(fast) },
        }
    }

    fn fixed_profile() -> ChainProfile {
        ChainProfile {
            fixed_gas_price: true,
            ..DEFAULT_CHAIN_PROFILE.clone()
        }
    }

    #[test]
    fn quote_for_native_pair_is_exact() {
        let pair = Pair::new("eth", "1");
        let levels = legacy_levels(40, 70, 100);

        let quote = calculate_fee_and_total(&DEFAULT_CHAIN_PROFILE, &pair, 0.5, &levels, None)
            .unwrap();

        // fast 100 gwei bumped by max(5%, 3 gwei) = 5 gwei
        assert_eq!(quote.gas_cost, gwei(105) * U256::from(550_000u64));
        assert_eq!(quote.total, U256::exp10(18));
        assert_eq!(quote.fee_percent, U256::from(5u64) * U256::exp10(15));
        assert_eq!(quote.fee, quote.gas_cost + quote.fee_percent);
        assert_eq!(quote.decimals, 18);
    }

    #[test]
    fn legacy_bump_floors_at_three_gwei() {
        let levels = legacy_levels(5, 8, 10);
        let price = select_withdrawal_gas_price(&DEFAULT_CHAIN_PROFILE, &levels).unwrap();
        // 5% of 10 gwei is 0.5 gwei, below the 3 gwei floor
        assert_eq!(price, gwei(13));
    }

    #[test]
    fn fixed_gas_chains_use_average_unbumped() {
        let levels = legacy_levels(3, 5, 20);
        let price = select_withdrawal_gas_price(&fixed_profile(), &levels).unwrap();
        assert_eq!(price, gwei(5));
    }

    #[test]
    fn eip1559_uses_fast_max_fee_directly() {
        let levels = GasPriceLevels {
            slow: GasPrice::Legacy { gas_price: gwei(10) },
            average: GasPrice::Legacy { gas_price: gwei(20) },
            fast: GasPrice::Eip1559 {
                max_fee_per_gas: gwei(42),
                max_priority_fee_per_gas: gwei(2),
            },
        };
        let price = select_withdrawal_gas_price(&DEFAULT_CHAIN_PROFILE, &levels).unwrap();
        assert_eq!(price, gwei(42));
    }

    #[test]
    fn overflowing_gas_quote_fails_without_aborting() {
        let pair = Pair::new("eth", "1");
        let levels = GasPriceLevels {
            slow: GasPrice::Legacy { gas_price: gwei(40) },
            average: GasPrice::Legacy { gas_price: gwei(70) },
            fast: GasPrice::Legacy { gas_price: U256::MAX },
        };

        let err = select_withdrawal_gas_price(&DEFAULT_CHAIN_PROFILE, &levels).unwrap_err();
        assert!(matches!(err, ClientError::InvalidAmount(_, _)));
        let err = calculate_fee_and_total(&DEFAULT_CHAIN_PROFILE, &pair, 0.5, &levels, None)
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidAmount(_, _)));

        // a 1559 quote at the ceiling passes selection but not the cost math
        let levels = GasPriceLevels {
            slow: GasPrice::Legacy { gas_price: gwei(40) },
            average: GasPrice::Legacy { gas_price: gwei(70) },
            fast: GasPrice::Eip1559 {
                max_fee_per_gas: U256::MAX,
                max_priority_fee_per_gas: gwei(2),
            },
        };
        let err = calculate_fee_and_total(&DEFAULT_CHAIN_PROFILE, &pair, 0.5, &levels, None)
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidAmount(_, _)));
    }

    #[test]
    fn percent_scaling_follows_decimal_precision() {
        let total = U256::exp10(18);
        assert_eq!(
            service_fee_portion(total, 0.5).unwrap(),
            U256::from(5u64) * U256::exp10(15)
        );
        assert_eq!(
            service_fee_portion(total, 0.05).unwrap(),
            U256::from(5u64) * U256::exp10(14)
        );
        assert_eq!(
            service_fee_portion(total, 5.0).unwrap(),
            U256::from(5u64) * U256::exp10(16)
        );
        assert_eq!(service_fee_portion(total, 0.0).unwrap(), U256::zero());
    }

    #[test]
    fn percent_rejects_non_finite_and_negative() {
        let total = U256::exp10(18);
        assert!(service_fee_portion(total, f64::NAN).is_err());
        assert!(service_fee_portion(total, f64::INFINITY).is_err());
        assert!(service_fee_portion(total, -0.5).is_err());
    }

    #[test]
    fn percent_rejects_out_of_range_and_unscalable_quotes() {
        let total = U256::exp10(18);
        assert!(matches!(
            service_fee_portion(total, 100.5),
            Err(ClientError::InvalidFeePercent(_))
        ));
        // 1e-80 is finite and non-negative but renders with 80 fractional
        // places, far past any scale the integer math can raise
        assert!(matches!(
            service_fee_portion(total, 1e-80),
            Err(ClientError::InvalidFeePercent(_))
        ));
        // the full-fee boundary still scales exactly
        assert_eq!(service_fee_portion(total, 100.0).unwrap(), total);
    }

    #[test]
    fn token_pair_converts_gas_cost_into_token_units() {
        let pair = Pair::new("usdc", "100");
        let levels = legacy_levels(40, 70, 100);
        let token = TokenQuote {
            decimals: Some(6),
            // one whole token worth 0.0005 native coin
            price_wei: Some(U256::from(5u64) * U256::exp10(14)),
        };

        let quote =
            calculate_fee_and_total(&DEFAULT_CHAIN_PROFILE, &pair, 0.5, &levels, Some(&token))
                .unwrap();

        let gas_cost_wei = gwei(105) * U256::from(550_000u64);
        let expected = gas_cost_wei * U256::exp10(6) / (U256::from(5u64) * U256::exp10(14));
        assert_eq!(quote.gas_cost, expected);
        assert_eq!(quote.total, U256::from(100u64) * U256::exp10(6));
        assert_eq!(quote.decimals, 6);
    }

    #[test]
    fn token_pair_without_decimals_fails_hard() {
        let pair = Pair::new("mist", "100");
        let levels = legacy_levels(40, 70, 100);
        let token = TokenQuote {
            decimals: None,
            price_wei: Some(U256::exp10(15)),
        };

        let err = calculate_fee_and_total(&DEFAULT_CHAIN_PROFILE, &pair, 0.5, &levels, Some(&token))
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingDecimals(_)));
    }

    #[test]
    fn token_pair_without_price_fails_hard() {
        let pair = Pair::new("usdc", "100");
        let levels = legacy_levels(40, 70, 100);
        for price_wei in [None, Some(U256::zero())] {
            let token = TokenQuote {
                decimals: Some(6),
                price_wei,
            };
            let err =
                calculate_fee_and_total(&DEFAULT_CHAIN_PROFILE, &pair, 0.5, &levels, Some(&token))
                    .unwrap_err();
            assert!(matches!(err, ClientError::MissingPrice(_)));
        }
    }

    #[test]
    fn parse_units_handles_fractions() {
        assert_eq!(parse_units("1", 18).unwrap(), U256::exp10(18));
        assert_eq!(parse_units("0.1", 18).unwrap(), U256::exp10(17));
        assert_eq!(parse_units("100", 6).unwrap(), U256::from(100u64) * U256::exp10(6));
        assert_eq!(parse_units("1.000001", 6).unwrap(), U256::from(1_000_001u64));
        assert_eq!(parse_units("0", 18).unwrap(), U256::zero());
    }

    #[test]
    fn parse_units_rejects_junk() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("1,5", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        // more fractional places than the token has
        assert!(parse_units("0.0000001", 6).is_err());
    }

    #[test]
    fn deposit_gas_limit_is_distinct() {
        let levels = legacy_levels(40, 70, 100);
        let deposit = estimate_deposit_gas_cost(&DEFAULT_CHAIN_PROFILE, &levels).unwrap();
        assert_eq!(deposit, gwei(105) * U256::from(DEPOSIT_GAS_LIMIT));
        assert_ne!(DEPOSIT_GAS_LIMIT, WITHDRAWAL_GAS_LIMIT);
    }
}
