//! pricing.rs - Constant-product AMM model
//!
//! Pure functions over `reserve0 * reserve1 = k`. Nothing here touches venue
//! state; the aggregator uses it to simulate a swap against fetched reserves.

use rust_decimal::Decimal;

use crate::error::{DexError, Result};
use crate::models::{OrderSide, Pair, Token};

/// Which side of the pool the input amount enters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Input is token0, output is token1 (selling the base token)
    SellToken0,
    /// Input is token1, output is token0 (buying the base token)
    BuyToken0,
}

impl SwapDirection {
    /// Direction of a swap that spends `token_in` on `pair`
    pub fn for_input(pair: &Pair, token_in: &Token) -> Self {
        if pair.token0 == *token_in {
            SwapDirection::SellToken0
        } else {
            SwapDirection::BuyToken0
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            SwapDirection::SellToken0 => OrderSide::Sell,
            SwapDirection::BuyToken0 => OrderSide::Buy,
        }
    }
}

/// Result of simulating one swap
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub amount_out: Decimal,
    /// token0 priced in token1, pre-trade
    pub spot_price: Decimal,
    /// token0 priced in token1, realised by this trade
    pub effective_price: Decimal,
    /// Percent; non-negative for honest trades
    pub price_impact: Decimal,
}

/// Spot price of token0 in units of token1
pub fn spot_price(pair_id: &str, reserve0: Decimal, reserve1: Decimal) -> Result<Decimal> {
    let illiquid = || DexError::IlliquidPair {
        pair: pair_id.to_string(),
    };
    if reserve0 <= Decimal::ZERO || reserve1 <= Decimal::ZERO {
        return Err(illiquid());
    }
    // Ratios outside Decimal's range in either direction cannot be priced
    reserve1
        .checked_div(reserve0)
        .filter(|price| *price > Decimal::ZERO)
        .ok_or_else(illiquid)
}

/// Simulate swapping `amount_in` through a constant-product pool
///
/// Output uses `reserve_out * amount_in / (reserve_in + amount_in)`, which is
/// `reserve_out - k / (reserve_in + amount_in)` without the cancelling
/// subtraction. The spot price is taken once from the pre-trade reserves and
/// impact is measured against it.
pub fn calculate_output_amount(
    pair_id: &str,
    reserve0: Decimal,
    reserve1: Decimal,
    amount_in: Decimal,
    direction: SwapDirection,
) -> Result<SwapQuote> {
    if amount_in <= Decimal::ZERO {
        return Err(DexError::InvalidAmount(amount_in));
    }
    let spot = spot_price(pair_id, reserve0, reserve1)?;
    let too_large = || DexError::InvalidAmount(amount_in);

    let (reserve_in, reserve_out) = match direction {
        SwapDirection::SellToken0 => (reserve0, reserve1),
        SwapDirection::BuyToken0 => (reserve1, reserve0),
    };
    let new_reserve_in = reserve_in.checked_add(amount_in).ok_or_else(too_large)?;
    // Share of the output reserve paid out, in (0, 1)
    let share = amount_in.checked_div(new_reserve_in).ok_or_else(too_large)?;
    let amount_out = reserve_out.checked_mul(share).ok_or_else(too_large)?;

    if amount_out <= Decimal::ZERO || amount_out >= reserve_out {
        return Err(too_large());
    }

    let (effective_price, price_impact) = match direction {
        SwapDirection::SellToken0 => {
            // r1 / (r0 + a); (spot - effective) / spot reduces to a / (r0 + a)
            let effective = reserve1.checked_div(new_reserve_in).ok_or_else(too_large)?;
            (effective, share)
        }
        SwapDirection::BuyToken0 => {
            // (r1 + a) / r0; (effective - spot) / spot reduces to a / r1
            let effective = new_reserve_in.checked_div(reserve0).ok_or_else(too_large)?;
            let relative = amount_in.checked_div(reserve1).ok_or_else(too_large)?;
            (effective, relative)
        }
    };
    let price_impact = price_impact
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(too_large)?;

    Ok(SwapQuote {
        amount_out,
        spot_price: spot,
        effective_price,
        price_impact,
    })
}

/// Slippage floor for a quoted output, `max_slippage` in percent
pub fn min_amount_out(amount_out: Decimal, max_slippage: Decimal) -> Decimal {
    let tolerance = (max_slippage / Decimal::ONE_HUNDRED).clamp(Decimal::ZERO, Decimal::ONE);
    amount_out * (Decimal::ONE - tolerance)
}
