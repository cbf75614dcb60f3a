//! gas.rs - Gas cost estimation
//!
//! There is no live gas oracle; `StaticGasEstimator` prices a swap from the
//! venue's configured gas limit and price hint.

use rust_decimal::Decimal;

use crate::config::DexConfig;
use crate::models::Pair;

/// Estimated cost, in native token, of swapping through `pair` on a venue
pub trait GasEstimator: Send + Sync {
    fn estimate(&self, venue: &DexConfig, pair: &Pair) -> Decimal;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticGasEstimator;

impl GasEstimator for StaticGasEstimator {
    fn estimate(&self, venue: &DexConfig, _pair: &Pair) -> Decimal {
        Decimal::from(venue.gas_limit).saturating_mul(venue.gas_price_hint)
    }
}
