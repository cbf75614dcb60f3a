//! venue.rs - Capability contract every DEX venue adapter implements
//!
//! The aggregator only ever talks to venues through `DexAdapter`. All
//! capabilities are required by the trait; an adapter that cannot serve a
//! particular variant (e.g. stop orders on an AMM) returns
//! `DexError::NotImplemented` for it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::{DexConfig, VenueKind};
use crate::error::{DexError, Result};
use crate::mock_venue::MockVenue;
use crate::models::{Order, OrderKind, OrderSide, Pair, Token, Trade};
use crate::subgraph_venue::SubgraphVenue;

/// Upper bound on pairs scanned when resolving a pair by symbol
const SYMBOL_SCAN_LIMIT: usize = 1000;

#[async_trait]
pub trait DexAdapter: Send + Sync {
    /// Display name of the venue
    fn name(&self) -> &str;

    /// Configuration supplied at construction
    fn config(&self) -> &DexConfig;

    /// Spot price of `pair.token0` in units of `pair.token1`
    async fn get_price(&self, pair: &Pair) -> Result<Decimal>;

    /// Current `(reserve0, reserve1)`
    async fn get_liquidity(&self, pair: &Pair) -> Result<(Decimal, Decimal)>;

    async fn create_order(
        &self,
        pair: &Pair,
        kind: OrderKind,
        side: OrderSide,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Result<Order>;

    async fn cancel_order(&self, order: &Order) -> Result<bool>;

    /// Latest known state of an order placed through this adapter
    async fn get_order_status(&self, order_id: &str) -> Result<Order>;

    /// Trades on `pair`, most recent first, at most `limit`
    async fn get_trades(
        &self,
        pair: &Pair,
        limit: usize,
        from_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>>;

    async fn get_pairs(&self, limit: usize) -> Result<Vec<Pair>>;

    async fn get_tokens(&self, limit: usize) -> Result<Vec<Token>>;

    /// Balance of `token` held by `address`, or by the configured wallet
    async fn get_balance(&self, token: &Token, address: Option<&str>) -> Result<Decimal>;

    /// Pair symbols such as "WETH/USDT"
    async fn get_trading_pairs(&self) -> Result<Vec<String>> {
        let pairs = self.get_pairs(SYMBOL_SCAN_LIMIT).await?;
        Ok(pairs.iter().map(Pair::symbol).collect())
    }
}

/// Construct the adapter serving `config.kind`
pub fn build_venue(config: &DexConfig) -> Result<Arc<dyn DexAdapter>> {
    let venue: Arc<dyn DexAdapter> = match config.kind {
        VenueKind::UniswapV2 => Arc::new(SubgraphVenue::uniswap_v2(config.clone())?),
        VenueKind::Sushiswap => Arc::new(SubgraphVenue::sushiswap(config.clone())?),
        VenueKind::Mock => Arc::new(MockVenue::from_config(config.clone())),
    };
    Ok(venue)
}

/// Parse "buy" / "sell" (any case)
pub fn parse_side(side: &str) -> Result<OrderSide> {
    match side.trim().to_ascii_lowercase().as_str() {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(DexError::OrderPlacementFailed {
            venue: String::new(),
            reason: format!("unknown order side '{}'", other),
        }),
    }
}

/// Find the pair whose symbol is exactly `symbol` ("BASE/QUOTE")
pub async fn find_pair_by_symbol(adapter: &dyn DexAdapter, symbol: &str) -> Result<Pair> {
    adapter
        .get_pairs(SYMBOL_SCAN_LIMIT)
        .await?
        .into_iter()
        .find(|p| p.symbol() == symbol)
        .ok_or_else(|| DexError::PairNotFound(symbol.to_string()))
}

/// `create_order` addressed by human-readable pair and side strings
pub async fn create_order_by_symbol(
    adapter: &dyn DexAdapter,
    symbol: &str,
    kind: OrderKind,
    side: &str,
    amount: Decimal,
    limit_price: Decimal,
) -> Result<Order> {
    let side = parse_side(side).map_err(|e| match e {
        DexError::OrderPlacementFailed { reason, .. } => DexError::OrderPlacementFailed {
            venue: adapter.name().to_string(),
            reason,
        },
        other => other,
    })?;
    let pair = find_pair_by_symbol(adapter, symbol).await?;
    adapter.create_order(&pair, kind, side, amount, limit_price).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use rust_decimal_macros::dec;

    fn venue() -> MockVenue {
        MockVenue::new("uniswap").with_pool(
            Token::new("0xweth", "WETH", "Wrapped Ether", 18, 1),
            Token::new("0xusdt", "USDT", "Tether USD", 6, 1),
            dec!(1000),
            dec!(1800000),
        )
    }

    #[tokio::test]
    async fn test_trading_pairs_are_symbols() {
        let pairs = venue().get_trading_pairs().await.unwrap();
        assert_eq!(pairs, vec!["WETH/USDT".to_string()]);
    }

    #[tokio::test]
    async fn test_create_order_by_symbol() {
        let venue = venue();
        let order = create_order_by_symbol(&venue, "WETH/USDT", OrderKind::Market, "SELL", dec!(2), Decimal::ZERO)
            .await
            .unwrap();

        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.amount, dec!(2));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_order_by_symbol_unknown_pair() {
        let err = create_order_by_symbol(&venue(), "USDT/WETH", OrderKind::Market, "buy", dec!(1), Decimal::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err, DexError::PairNotFound("USDT/WETH".to_string()));
    }

    #[test]
    fn test_build_venue_by_kind() {
        let venue = build_venue(&DexConfig::new("sushi", VenueKind::Sushiswap)).unwrap();
        assert_eq!(venue.name(), "sushi");
        assert_eq!(venue.config().kind, VenueKind::Sushiswap);
    }

    #[tokio::test]
    async fn test_create_order_by_symbol_bad_side() {
        let err = create_order_by_symbol(&venue(), "WETH/USDT", OrderKind::Market, "hold", dec!(1), Decimal::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ORDER_PLACEMENT_FAILED");
    }
}
