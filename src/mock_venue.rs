//! mock_venue.rs - In-memory constant-product venue
//!
//! Serves pools from memory with the same order semantics as the live
//! adapters. Call counters, artificial latency and forced failures make it
//! usable as a spy in aggregator tests and for dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::{DexConfig, VenueKind};
use crate::error::{DexError, Result};
use crate::models::{Order, OrderKind, OrderSide, OrderStatus, Pair, Token, Trade, TradeStatus};
use crate::order_book::{self, OrderBook};
use crate::pricing::{self, SwapDirection};
use crate::venue::DexAdapter;

#[derive(Debug, Clone)]
struct Pool {
    pair: Pair,
    reserve0: Decimal,
    reserve1: Decimal,
}

/// Mock venue for testing and development
#[derive(Debug)]
pub struct MockVenue {
    config: DexConfig,
    pools: Vec<Pool>,
    latency: Option<Duration>,
    failing: AtomicBool,
    auto_fill: bool,
    orders: OrderBook,
    trades: RwLock<Vec<Trade>>,
    balances: HashMap<String, Decimal>,
    get_pairs_calls: AtomicUsize,
    get_liquidity_calls: AtomicUsize,
}

impl MockVenue {
    pub fn new(name: &str) -> Self {
        Self::from_config(DexConfig::new(name, VenueKind::Mock))
    }

    pub fn from_config(config: DexConfig) -> Self {
        MockVenue {
            config,
            pools: Vec::new(),
            latency: None,
            failing: AtomicBool::new(false),
            auto_fill: false,
            orders: OrderBook::new(),
            trades: RwLock::new(Vec::new()),
            balances: HashMap::new(),
            get_pairs_calls: AtomicUsize::new(0),
            get_liquidity_calls: AtomicUsize::new(0),
        }
    }

    /// Add a 0.3% pool; the pair id is derived from venue name and symbols
    pub fn with_pool(mut self, token0: Token, token1: Token, reserve0: Decimal, reserve1: Decimal) -> Self {
        let id = format!("{}:{}/{}", self.config.venue_name, token0.symbol, token1.symbol);
        let pair = Pair::new(&id, token0, token1, Decimal::new(3, 3), "mock_amm");
        self.pools.push(Pool { pair, reserve0, reserve1 });
        self
    }

    /// Delay every venue query by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.config.gas_limit = gas_limit;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Fill market orders at the quoted effective price as soon as they are placed
    pub fn with_auto_fill(mut self) -> Self {
        self.auto_fill = true;
        self
    }

    pub fn with_balance(mut self, token: &Token, amount: Decimal) -> Self {
        self.balances.insert(token.address_key(), amount);
        self
    }

    /// Make every subsequent query fail with `VenueError`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_pairs_calls(&self) -> usize {
        self.get_pairs_calls.load(Ordering::SeqCst)
    }

    pub fn get_liquidity_calls(&self) -> usize {
        self.get_liquidity_calls.load(Ordering::SeqCst)
    }

    /// Record a fill for an order placed on this venue
    pub async fn record_fill(&self, order_id: &str, price: Decimal) -> Result<Trade> {
        let order = self.orders.get(&self.config.venue_name, order_id).await?;
        let trade = Trade {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: Some(order.id.clone()),
            pair: order.pair.clone(),
            side: order.side,
            amount: order.amount,
            price,
            fee: order.amount.saturating_mul(order.pair.fee_rate),
            status: TradeStatus::Confirmed,
            timestamp: Utc::now(),
            tx_hash: order.tx_hash.clone(),
            metadata: HashMap::new(),
        };
        self.orders.set_status(order_id, OrderStatus::Filled).await;
        self.trades.write().await.push(trade.clone());
        Ok(trade)
    }

    async fn simulate_io(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DexError::venue(&self.config.venue_name, "forced failure"));
        }
        Ok(())
    }

    fn pool(&self, pair: &Pair) -> Result<&Pool> {
        self.pools
            .iter()
            .find(|p| p.pair.id == pair.id)
            .ok_or_else(|| DexError::PairNotFound(pair.id.clone()))
    }
}

#[async_trait]
impl DexAdapter for MockVenue {
    fn name(&self) -> &str {
        &self.config.venue_name
    }

    fn config(&self) -> &DexConfig {
        &self.config
    }

    async fn get_price(&self, pair: &Pair) -> Result<Decimal> {
        let (reserve0, reserve1) = self.get_liquidity(pair).await?;
        pricing::spot_price(&pair.id, reserve0, reserve1)
    }

    async fn get_liquidity(&self, pair: &Pair) -> Result<(Decimal, Decimal)> {
        self.get_liquidity_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;
        let pool = self.pool(pair)?;
        Ok((pool.reserve0, pool.reserve1))
    }

    async fn create_order(
        &self,
        pair: &Pair,
        kind: OrderKind,
        side: OrderSide,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Result<Order> {
        self.simulate_io().await?;
        let pool = self.pool(pair)?;
        let order = order_book::new_amm_order(
            &self.config,
            &pool.pair,
            kind,
            side,
            amount,
            limit_price,
            (pool.reserve0, pool.reserve1),
        )?;
        debug!("{}: accepted {} {} order {}", self.config.venue_name, kind, side, order.id);
        let order = self.orders.insert(order).await;
        if !self.auto_fill || kind != OrderKind::Market {
            return Ok(order);
        }

        let direction = match side {
            OrderSide::Sell => SwapDirection::SellToken0,
            OrderSide::Buy => SwapDirection::BuyToken0,
        };
        let quote = pricing::calculate_output_amount(&pool.pair.id, pool.reserve0, pool.reserve1, amount, direction)?;
        self.record_fill(&order.id, quote.effective_price).await?;
        self.orders.get(&self.config.venue_name, &order.id).await
    }

    async fn cancel_order(&self, order: &Order) -> Result<bool> {
        self.simulate_io().await?;
        Ok(self.orders.cancel(&order.id).await)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Order> {
        self.simulate_io().await?;
        self.orders.get(&self.config.venue_name, order_id).await
    }

    async fn get_trades(
        &self,
        pair: &Pair,
        limit: usize,
        from_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>> {
        self.simulate_io().await?;
        let trades = self.trades.read().await;
        Ok(trades
            .iter()
            .rev()
            .filter(|t| t.pair.id == pair.id)
            .filter(|t| from_time.map_or(true, |from| t.timestamp >= from))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_pairs(&self, limit: usize) -> Result<Vec<Pair>> {
        self.get_pairs_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_io().await?;
        Ok(self.pools.iter().take(limit).map(|p| p.pair.clone()).collect())
    }

    async fn get_tokens(&self, limit: usize) -> Result<Vec<Token>> {
        self.simulate_io().await?;
        let mut tokens: Vec<Token> = Vec::new();
        for pool in &self.pools {
            for token in [&pool.pair.token0, &pool.pair.token1] {
                if !tokens.contains(token) {
                    tokens.push(token.clone());
                }
            }
        }
        tokens.truncate(limit);
        Ok(tokens)
    }

    async fn get_balance(&self, token: &Token, address: Option<&str>) -> Result<Decimal> {
        self.simulate_io().await?;
        let owner = address
            .filter(|a| !a.is_empty())
            .or_else(|| self.config.wallet_address());
        if owner.is_none() {
            return Err(DexError::venue(&self.config.venue_name, "no wallet address configured"));
        }
        Ok(self.balances.get(&token.address_key()).copied().unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use rust_decimal_macros::dec;

    fn weth() -> Token {
        Token::new("0xweth", "WETH", "Wrapped Ether", 18, 1)
    }

    fn usdt() -> Token {
        Token::new("0xusdt", "USDT", "Tether USD", 6, 1)
    }

    fn venue() -> MockVenue {
        MockVenue::new("sushiswap").with_pool(weth(), usdt(), dec!(1000), dec!(1800000))
    }

    #[tokio::test]
    async fn test_mock_price_and_liquidity() {
        let venue = venue();
        let pair = venue.get_pairs(10).await.unwrap().remove(0);

        assert_eq!(venue.get_price(&pair).await.unwrap(), dec!(1800));
        assert_eq!(venue.get_liquidity(&pair).await.unwrap(), (dec!(1000), dec!(1800000)));
        assert_eq!(venue.get_pairs_calls(), 1);
        assert_eq!(venue.get_liquidity_calls(), 2);
    }

    #[tokio::test]
    async fn test_order_lifecycle_and_trades() {
        let venue = venue();
        let pair = venue.get_pairs(10).await.unwrap().remove(0);
        let order = venue
            .create_order(&pair, OrderKind::Market, OrderSide::Sell, dec!(1), Decimal::ZERO)
            .await
            .unwrap();

        assert!(venue.get_trades(&pair, 10, None).await.unwrap().is_empty());

        venue.record_fill(&order.id, dec!(1797)).await.unwrap();
        let trades = venue.get_trades(&pair, 10, Some(order.created_at)).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].order_id.as_deref(), Some(order.id.as_str()));

        let refreshed = venue.get_order_status(&order.id).await.unwrap();
        assert_eq!(refreshed.status, OrderStatus::Filled);
        assert!(!venue.cancel_order(&refreshed).await.unwrap());
    }

    #[tokio::test]
    async fn test_auto_fill_confirms_market_orders() {
        let venue = venue().with_auto_fill();
        let pair = venue.get_pairs(10).await.unwrap().remove(0);

        let order = venue
            .create_order(&pair, OrderKind::Market, OrderSide::Sell, dec!(1), Decimal::ZERO)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let trades = venue.get_trades(&pair, 10, Some(order.created_at)).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Confirmed);
        // 1_800_000 / 1001
        assert!(trades[0].price > dec!(1798.20) && trades[0].price < dec!(1798.21));

        let limit = venue
            .create_order(&pair, OrderKind::Limit, OrderSide::Buy, dec!(1800), dec!(1700))
            .await
            .unwrap();
        assert_eq!(limit.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_forced_failure() {
        let venue = venue();
        venue.set_failing(true);
        assert_eq!(venue.get_pairs(10).await.unwrap_err().code(), "VENUE_ERROR");
    }

    #[tokio::test]
    async fn test_balance_defaults_to_configured_wallet() {
        let mut config = DexConfig::new("sushiswap", VenueKind::Mock);
        config.credentials = Some(Credentials {
            wallet_address: "0xwallet".to_string(),
            api_key: None,
        });
        let venue = MockVenue::from_config(config).with_balance(&weth(), dec!(3.5));

        assert_eq!(venue.get_balance(&weth(), None).await.unwrap(), dec!(3.5));
        assert_eq!(venue.get_balance(&usdt(), Some("0xother")).await.unwrap(), Decimal::ZERO);

        let unconfigured = MockVenue::new("bare");
        assert!(unconfigured.get_balance(&weth(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_tokens_are_deduplicated() {
        let venue = venue().with_pool(weth(), Token::new("0xdai", "DAI", "Dai", 18, 1), dec!(10), dec!(18000));
        let tokens = venue.get_tokens(10).await.unwrap();
        assert_eq!(tokens.len(), 3);
    }
}
