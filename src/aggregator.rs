//! aggregator.rs - Multi-venue discovery, pricing and routing
//!
//! Every query fans out to all registered venues concurrently, each bounded by
//! the venue's request timeout and the caller's deadline. Venues that fail or
//! time out are dropped from that call's candidate set; the call itself only
//! fails when no venue produces a usable candidate.

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

use crate::cache::VenueCache;
use crate::config::{AggregatorConfig, AppConfig};
use crate::error::{DexError, Result};
use crate::gas::{GasEstimator, StaticGasEstimator};
use crate::models::{OrderKind, Pair, RouteHop, Token, Trade, TradeRoute, TradeStatus};
use crate::pricing::{self, SwapDirection, SwapQuote};
use crate::venue::{self, DexAdapter};

/// A pair listed by a specific venue
#[derive(Debug, Clone, PartialEq)]
pub struct PairListing {
    pub venue: String,
    pub pair: Pair,
}

/// Best spot price, normalized to token_out per token_in
#[derive(Debug, Clone, PartialEq)]
pub struct BestPrice {
    pub price: Decimal,
    pub venue: String,
    pub pair: Pair,
}

#[derive(Debug)]
struct ScoredCandidate {
    listing: PairListing,
    direction: SwapDirection,
    quote: SwapQuote,
    gas: Decimal,
}

impl ScoredCandidate {
    /// More output, then less impact, then less gas
    fn beats(&self, other: &ScoredCandidate) -> bool {
        if self.quote.amount_out != other.quote.amount_out {
            return self.quote.amount_out > other.quote.amount_out;
        }
        if self.quote.price_impact != other.quote.price_impact {
            return self.quote.price_impact < other.quote.price_impact;
        }
        self.gas < other.gas
    }
}

/// Bound a venue query by the venue's timeout and the caller's deadline
async fn bounded<T, F>(venue: &dyn DexAdapter, deadline: Instant, query: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timeout = venue
        .config()
        .request_timeout()
        .min(deadline.saturating_duration_since(Instant::now()));
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => result,
        Err(_) => Err(DexError::VenueTimeout {
            venue: venue.name().to_string(),
            timeout,
        }),
    }
}

fn no_candidates(token_in: &Token, token_out: &Token, illiquid: Option<String>) -> DexError {
    match illiquid {
        Some(pair) => DexError::IlliquidPair { pair },
        None => DexError::NoPairsFound {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
        },
    }
}

pub struct Aggregator {
    venues: Vec<Arc<dyn DexAdapter>>,
    config: AggregatorConfig,
    gas: Arc<dyn GasEstimator>,
    pairs_cache: VenueCache<Vec<PairListing>>,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Aggregator {
            venues: Vec::new(),
            config,
            gas: Arc::new(StaticGasEstimator),
            pairs_cache: VenueCache::new(),
        }
    }

    /// Build an aggregator with every configured venue registered
    pub fn from_app_config(app: &AppConfig) -> Result<Self> {
        let mut aggregator = Aggregator::new(app.aggregator.clone());
        for venue_config in &app.venues {
            aggregator.register(venue::build_venue(venue_config)?);
        }
        Ok(aggregator)
    }

    pub fn with_gas_estimator(mut self, gas: Arc<dyn GasEstimator>) -> Self {
        self.gas = gas;
        self
    }

    /// Register a venue; a venue with the same name is replaced in place
    pub fn register(&mut self, adapter: Arc<dyn DexAdapter>) {
        match self.venues.iter().position(|v| v.name() == adapter.name()) {
            Some(index) => {
                warn!("Replacing already registered venue '{}'", adapter.name());
                self.venues[index] = adapter;
            }
            None => {
                info!("Registered venue '{}'", adapter.name());
                self.venues.push(adapter);
            }
        }
        self.pairs_cache = VenueCache::new();
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Display names of registered venues, in registration order
    pub fn get_supported_dexes(&self) -> Vec<String> {
        self.venues.iter().map(|v| v.name().to_string()).collect()
    }

    fn venue(&self, name: &str) -> Option<&Arc<dyn DexAdapter>> {
        self.venues.iter().find(|v| v.name() == name)
    }

    fn default_deadline(&self) -> Instant {
        Instant::now() + self.config.query_budget()
    }

    pub async fn find_token_pairs(&self, token_in: &Token, token_out: &Token) -> Result<Vec<PairListing>> {
        self.find_token_pairs_until(token_in, token_out, self.default_deadline())
            .await
    }

    /// Pairs trading `token_in` against `token_out` (either order) on any venue
    pub async fn find_token_pairs_until(
        &self,
        token_in: &Token,
        token_out: &Token,
        deadline: Instant,
    ) -> Result<Vec<PairListing>> {
        let key = format!("pairs_{}_{}", token_in.address_key(), token_out.address_key());
        if let Some(cached) = self.pairs_cache.get(&key, self.config.pair_cache_ttl()).await {
            debug!("Cache hit for {}", key);
            return Ok(cached);
        }

        let limit = self.config.pair_scan_limit;
        let queries = self.venues.iter().map(|venue| async move {
            let result = bounded(venue.as_ref(), deadline, venue.get_pairs(limit)).await;
            (venue.name(), result)
        });

        let mut listings = Vec::new();
        let mut complete = true;
        for (name, result) in join_all(queries).await {
            match result {
                Ok(pairs) => listings.extend(
                    pairs
                        .into_iter()
                        .filter(|p| p.connects(token_in, token_out))
                        .map(|pair| PairListing {
                            venue: name.to_string(),
                            pair,
                        }),
                ),
                Err(e) => {
                    warn!("Skipping venue '{}' during pair discovery: {}", name, e);
                    complete = false;
                }
            }
        }

        debug!(
            "Found {} listings for {} / {} across {} venues",
            listings.len(),
            token_in,
            token_out,
            self.venues.len()
        );
        if complete {
            self.pairs_cache.set(key, listings.clone()).await;
        }
        Ok(listings)
    }

    pub async fn get_best_price(&self, token_in: &Token, token_out: &Token) -> Result<BestPrice> {
        self.get_best_price_until(token_in, token_out, self.default_deadline())
            .await
    }

    /// Highest spot price across venues, in token_out per token_in
    pub async fn get_best_price_until(
        &self,
        token_in: &Token,
        token_out: &Token,
        deadline: Instant,
    ) -> Result<BestPrice> {
        let listings = self.find_token_pairs_until(token_in, token_out, deadline).await?;
        if listings.is_empty() {
            return Err(no_candidates(token_in, token_out, None));
        }

        let queries = listings.into_iter().filter_map(|listing| {
            let venue = self.venue(&listing.venue)?.clone();
            Some(async move {
                let result = bounded(venue.as_ref(), deadline, venue.get_price(&listing.pair)).await;
                (listing, result)
            })
        });

        let mut best: Option<BestPrice> = None;
        let mut illiquid = None;
        for (listing, result) in join_all(queries).await {
            let raw = match result {
                Ok(price) if price > Decimal::ZERO => price,
                Ok(_) | Err(DexError::IlliquidPair { .. }) => {
                    warn!("Skipping illiquid pair {} on '{}'", listing.pair, listing.venue);
                    illiquid = Some(listing.pair.id.clone());
                    continue;
                }
                Err(e) => {
                    warn!("Skipping '{}' for price of {}: {}", listing.venue, listing.pair, e);
                    continue;
                }
            };

            let price = if listing.pair.token0 == *token_in {
                raw
            } else {
                match Decimal::ONE.checked_div(raw) {
                    Some(inverted) => inverted,
                    None => {
                        warn!("Skipping unpriceable pair {} on '{}'", listing.pair, listing.venue);
                        illiquid = Some(listing.pair.id.clone());
                        continue;
                    }
                }
            };
            if best.as_ref().map_or(true, |b| price > b.price) {
                best = Some(BestPrice {
                    price,
                    venue: listing.venue,
                    pair: listing.pair,
                });
            }
        }

        best.ok_or_else(|| no_candidates(token_in, token_out, illiquid))
    }

    pub async fn get_best_route(&self, token_in: &Token, token_out: &Token, amount_in: Decimal) -> Result<TradeRoute> {
        self.get_best_route_until(token_in, token_out, amount_in, self.default_deadline())
            .await
    }

    /// Single-hop route maximizing output for `amount_in`
    pub async fn get_best_route_until(
        &self,
        token_in: &Token,
        token_out: &Token,
        amount_in: Decimal,
        deadline: Instant,
    ) -> Result<TradeRoute> {
        if amount_in <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(amount_in));
        }
        let listings = self.find_token_pairs_until(token_in, token_out, deadline).await?;
        if listings.is_empty() {
            return Err(no_candidates(token_in, token_out, None));
        }

        let queries = listings.into_iter().filter_map(|listing| {
            let venue = self.venue(&listing.venue)?.clone();
            Some(async move {
                let reserves = bounded(venue.as_ref(), deadline, venue.get_liquidity(&listing.pair)).await;
                let gas = self.gas.estimate(venue.config(), &listing.pair);
                (listing, reserves, gas)
            })
        });

        let mut best: Option<ScoredCandidate> = None;
        let mut illiquid = None;
        for (listing, reserves, gas) in join_all(queries).await {
            let direction = SwapDirection::for_input(&listing.pair, token_in);
            let quote = reserves.and_then(|(r0, r1)| {
                pricing::calculate_output_amount(&listing.pair.id, r0, r1, amount_in, direction)
            });
            let quote = match quote {
                Ok(quote) => quote,
                Err(DexError::IlliquidPair { pair }) => {
                    warn!("Skipping illiquid pair {} on '{}'", pair, listing.venue);
                    illiquid = Some(pair);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping '{}' for route via {}: {}", listing.venue, listing.pair, e);
                    continue;
                }
            };
            debug!(
                "Candidate {} on '{}': out {} impact {}% gas {}",
                listing.pair, listing.venue, quote.amount_out, quote.price_impact, gas
            );

            let candidate = ScoredCandidate {
                listing,
                direction,
                quote,
                gas,
            };
            if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }

        let winner = best.ok_or_else(|| no_candidates(token_in, token_out, illiquid))?;
        let pair = winner.listing.pair;
        let (route_in, route_out) = match winner.direction {
            SwapDirection::SellToken0 => (pair.token0.clone(), pair.token1.clone()),
            SwapDirection::BuyToken0 => (pair.token1.clone(), pair.token0.clone()),
        };

        let route = TradeRoute {
            hops: vec![RouteHop {
                venue: winner.listing.venue,
                pair,
            }],
            token_in: route_in,
            token_out: route_out,
            amount_in,
            expected_amount_out: winner.quote.amount_out,
            price_impact: winner.quote.price_impact,
            estimated_gas: winner.gas,
        };
        info!("Best route: {}", route);
        Ok(route)
    }

    /// Place a market order for a single-hop route
    ///
    /// Not idempotent and never retried; after a timeout the caller must query
    /// order status on the venue before trying again.
    pub async fn execute_trade(&self, route: &TradeRoute) -> Result<Trade> {
        let hop = match route.hops.as_slice() {
            [] => return Err(DexError::EmptyRoute),
            [hop] => hop,
            hops => return Err(DexError::UnsupportedMultiHop { hops: hops.len() }),
        };
        let venue = self
            .venue(&hop.venue)
            .ok_or_else(|| DexError::venue(&hop.venue, "venue is not registered"))?;

        let pair = &hop.pair;
        if !pair.connects(&route.token_in, &route.token_out) {
            return Err(DexError::PairNotFound(format!(
                "{} does not trade {} for {}",
                pair, route.token_in, route.token_out
            )));
        }
        let direction = SwapDirection::for_input(pair, &route.token_in);

        let deadline = Instant::now() + venue.config().request_timeout();
        let order = bounded(
            venue.as_ref(),
            deadline,
            venue.create_order(pair, OrderKind::Market, direction.side(), route.amount_in, Decimal::ZERO),
        )
        .await
        .map_err(|e| match e {
            DexError::VenueError { venue, message } => DexError::OrderPlacementFailed { venue, reason: message },
            other => other,
        })?;
        info!(
            "Placed {} order {} on '{}' for {} {}",
            order.side, order.id, hop.venue, route.amount_in, route.token_in
        );

        let deadline = Instant::now() + venue.config().request_timeout();
        let trades = bounded(
            venue.as_ref(),
            deadline,
            venue.get_trades(pair, self.config.trade_lookup_limit, Some(order.created_at)),
        )
        .await;
        let fill = match trades {
            Ok(trades) => trades
                .into_iter()
                .find(|t| t.order_id.as_deref() == Some(order.id.as_str())),
            Err(e) => {
                warn!("Could not fetch trades for order {} on '{}': {}", order.id, hop.venue, e);
                None
            }
        };
        if let Some(trade) = fill {
            return Ok(trade);
        }

        if !self.config.simulate {
            return Err(DexError::OrderPlacementFailed {
                venue: hop.venue.clone(),
                reason: format!(
                    "order {} placed but no fill reported; query its status before retrying",
                    order.id
                ),
            });
        }

        if route.expected_amount_out <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(route.expected_amount_out));
        }
        let price = match direction {
            SwapDirection::SellToken0 => route.expected_amount_out.checked_div(route.amount_in),
            SwapDirection::BuyToken0 => route.amount_in.checked_div(route.expected_amount_out),
        }
        .ok_or(DexError::InvalidAmount(route.amount_in))?;
        let fee = route
            .amount_in
            .checked_mul(pair.fee_rate)
            .ok_or(DexError::InvalidAmount(route.amount_in))?;
        let mut metadata = HashMap::new();
        metadata.insert("simulated".to_string(), "true".to_string());
        metadata.insert("venue".to_string(), hop.venue.clone());
        metadata.insert("expected_amount_out".to_string(), route.expected_amount_out.to_string());

        debug!("Synthesizing pending trade for order {}", order.id);
        Ok(Trade {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: Some(order.id.clone()),
            pair: pair.clone(),
            side: order.side,
            amount: route.amount_in,
            price,
            fee,
            status: TradeStatus::Pending,
            timestamp: Utc::now(),
            tx_hash: order.tx_hash.clone(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_venue::MockVenue;
    use crate::models::{OrderSide, OrderStatus};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn weth() -> Token {
        Token::new("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", "WETH", "Wrapped Ether", 18, 1)
    }

    fn usdt() -> Token {
        Token::new("0xdAC17F958D2ee523a2206206994597C13D831ec7", "USDT", "Tether USD", 6, 1)
    }

    fn dai() -> Token {
        Token::new("0x6B175474E89094C44Da98b954EedeAC495271d0F", "DAI", "Dai Stablecoin", 18, 1)
    }

    fn aggregator_with(venues: Vec<Arc<MockVenue>>, simulate: bool) -> Aggregator {
        let config = AggregatorConfig {
            simulate,
            ..AggregatorConfig::default()
        };
        let mut aggregator = Aggregator::new(config);
        for venue in venues {
            aggregator.register(venue);
        }
        aggregator
    }

    fn two_weth_usdt_venues() -> (Arc<MockVenue>, Arc<MockVenue>) {
        let a = Arc::new(MockVenue::new("uniswap").with_pool(weth(), usdt(), dec!(950), dec!(1762487.5)));
        let b = Arc::new(MockVenue::new("sushiswap").with_pool(weth(), usdt(), dec!(1000), dec!(1800000)));
        (a, b)
    }

    #[tokio::test]
    async fn test_supported_dexes_in_registration_order() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a, b], false);
        assert_eq!(aggregator.get_supported_dexes(), vec!["uniswap", "sushiswap"]);
    }

    #[tokio::test]
    async fn test_find_token_pairs_matches_either_order() {
        let a = Arc::new(
            MockVenue::new("uniswap")
                .with_pool(weth(), usdt(), dec!(10), dec!(18000))
                .with_pool(weth(), dai(), dec!(10), dec!(18000)),
        );
        let b = Arc::new(MockVenue::new("sushiswap").with_pool(usdt(), weth(), dec!(18000), dec!(10)));
        let aggregator = aggregator_with(vec![a, b], false);

        let listings = aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].venue, "uniswap");
        assert_eq!(listings[1].venue, "sushiswap");

        assert!(aggregator.find_token_pairs(&usdt(), &dai()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_token_pairs_cached_within_ttl() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a.clone(), b.clone()], false);

        let first = aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        let second = aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(a.get_pairs_calls(), 1);
        assert_eq!(b.get_pairs_calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(a.get_pairs_calls(), 2);
        assert_eq!(b.get_pairs_calls(), 2);
    }

    #[tokio::test]
    async fn test_best_price_normalizes_direction() {
        let a = Arc::new(MockVenue::new("uniswap").with_pool(weth(), usdt(), dec!(1000), dec!(1800000)));
        let b = Arc::new(MockVenue::new("sushiswap").with_pool(usdt(), weth(), dec!(1850000), dec!(1000)));
        let aggregator = aggregator_with(vec![a, b], false);

        let best = aggregator.get_best_price(&weth(), &usdt()).await.unwrap();
        assert_eq!(best.venue, "sushiswap");
        assert!((best.price - dec!(1850)).abs() < dec!(0.000001));
    }

    #[tokio::test]
    async fn test_best_price_symmetric_for_single_pair() {
        let a = Arc::new(MockVenue::new("uniswap").with_pool(weth(), usdt(), dec!(1000), dec!(1800000)));
        let aggregator = aggregator_with(vec![a], false);

        let forward = aggregator.get_best_price(&weth(), &usdt()).await.unwrap();
        let backward = aggregator.get_best_price(&usdt(), &weth()).await.unwrap();

        assert_eq!(forward.venue, backward.venue);
        assert_eq!(forward.pair, backward.pair);
        let inverted = Decimal::ONE / backward.price;
        assert!((inverted - forward.price).abs() < dec!(0.000001));
    }

    #[tokio::test]
    async fn test_unrepresentable_prices_do_not_sink_the_query() {
        // Spot 1e30 overflows Decimal and 1e-30 underflows it
        let weird = Arc::new(
            MockVenue::new("weird")
                .with_pool(weth(), usdt(), dec!(0.0000000001), dec!(100000000000000000000))
                .with_pool(usdt(), weth(), dec!(100000000000000000000), dec!(0.0000000001)),
        );
        let sane = Arc::new(MockVenue::new("sane").with_pool(weth(), usdt(), dec!(1000), dec!(1800000)));
        let aggregator = aggregator_with(vec![weird, sane], false);

        let best = aggregator.get_best_price(&weth(), &usdt()).await.unwrap();
        assert_eq!(best.venue, "sane");
        assert_eq!(best.price, dec!(1800));

        let best = aggregator.get_best_price(&usdt(), &weth()).await.unwrap();
        assert_eq!(best.venue, "sane");

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.hops[0].venue, "sane");
        assert!(route.price_impact >= Decimal::ZERO);

        let route = aggregator
            .get_best_route(&usdt(), &weth(), dec!(0.000000000000000001))
            .await
            .unwrap();
        assert_eq!(route.hops[0].venue, "sane");
        assert!(route.price_impact >= Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_best_price_skips_failing_venue() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a.clone(), b], false);

        let best = aggregator.get_best_price(&weth(), &usdt()).await.unwrap();
        assert_eq!(best.venue, "uniswap");

        // Discovery is cached, so only the price query fails
        a.set_failing(true);
        let best = aggregator.get_best_price(&weth(), &usdt()).await.unwrap();
        assert_eq!(best.venue, "sushiswap");
        assert_eq!(best.price, dec!(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_price_skips_slow_venue() {
        let (_, fast) = two_weth_usdt_venues();
        let slow = Arc::new(
            MockVenue::new("slow")
                .with_pool(weth(), usdt(), dec!(1000), dec!(2000000))
                .with_latency(Duration::from_secs(30))
                .with_request_timeout(Duration::from_secs(2)),
        );
        let aggregator = aggregator_with(vec![slow, fast], false);

        let best = aggregator.get_best_price(&weth(), &usdt()).await.unwrap();
        assert_eq!(best.venue, "sushiswap");
    }

    #[tokio::test]
    async fn test_partial_discovery_is_not_cached() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a.clone(), b.clone()], false);

        b.set_failing(true);
        let listings = aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(listings.len(), 1);
        aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(a.get_pairs_calls(), 2);

        b.set_failing(false);
        let listings = aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(listings.len(), 2);
        aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();
        assert_eq!(a.get_pairs_calls(), 3);
        assert_eq!(b.get_pairs_calls(), 3);
    }

    #[tokio::test]
    async fn test_best_price_without_pairs() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a, b], false);

        let err = aggregator.get_best_price(&weth(), &dai()).await.unwrap_err();
        assert_eq!(err.code(), "NO_PAIRS_FOUND");
    }

    #[tokio::test]
    async fn test_best_route_picks_higher_output() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![b, a], false);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.hops.len(), 1);
        assert_eq!(route.hops[0].venue, "uniswap");
        // 1_762_487.5 / 951
        assert!(route.expected_amount_out > dec!(1853.29) && route.expected_amount_out < dec!(1853.30));
        assert_eq!(route.token_in, weth());
        assert_eq!(route.token_out.symbol, "USDT");
    }

    #[tokio::test]
    async fn test_best_route_tie_broken_by_price_impact() {
        // Both pay out exactly 100 USDT for 1 WETH; the deeper pool moves less
        let shallow = Arc::new(MockVenue::new("shallow").with_pool(weth(), usdt(), dec!(9), dec!(1000)));
        let deep = Arc::new(MockVenue::new("deep").with_pool(weth(), usdt(), dec!(19), dec!(2000)));
        let aggregator = aggregator_with(vec![shallow, deep], false);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.expected_amount_out, dec!(100));
        assert_eq!(route.hops[0].venue, "deep");
    }

    #[tokio::test]
    async fn test_best_route_tie_broken_by_gas() {
        let costly = Arc::new(
            MockVenue::new("costly")
                .with_pool(weth(), usdt(), dec!(1000), dec!(1800000))
                .with_gas_limit(300_000),
        );
        let cheap = Arc::new(
            MockVenue::new("cheap")
                .with_pool(weth(), usdt(), dec!(1000), dec!(1800000))
                .with_gas_limit(120_000),
        );
        let aggregator = aggregator_with(vec![costly, cheap], false);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.hops[0].venue, "cheap");
        assert_eq!(route.estimated_gas, dec!(0.0024));
    }

    #[tokio::test]
    async fn test_best_route_skips_failing_venue() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a.clone(), b], false);
        aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap();

        a.set_failing(true);
        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.hops[0].venue, "sushiswap");
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_route_skips_slow_venue() {
        let (_, fast) = two_weth_usdt_venues();
        let slow = Arc::new(
            MockVenue::new("slow")
                .with_pool(weth(), usdt(), dec!(950), dec!(1762487.5))
                .with_latency(Duration::from_secs(30))
                .with_request_timeout(Duration::from_secs(2)),
        );
        let aggregator = aggregator_with(vec![slow, fast], false);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.hops[0].venue, "sushiswap");
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_bounds_hung_venues() {
        let hung = Arc::new(
            MockVenue::new("hung")
                .with_pool(weth(), usdt(), dec!(1000), dec!(1800000))
                .with_latency(Duration::from_secs(3600)),
        );
        let aggregator = aggregator_with(vec![hung], false);

        let start = Instant::now();
        let deadline = start + Duration::from_millis(500);
        let err = aggregator
            .get_best_route_until(&weth(), &usdt(), dec!(1), deadline)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "NO_PAIRS_FOUND");
        assert!(start.elapsed() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_best_route_reports_illiquid_pairs() {
        let empty = Arc::new(MockVenue::new("empty").with_pool(weth(), usdt(), Decimal::ZERO, Decimal::ZERO));
        let aggregator = aggregator_with(vec![empty], false);

        let err = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap_err();
        assert_eq!(err.code(), "ILLIQUID_PAIR");
    }

    #[tokio::test]
    async fn test_best_route_rejects_non_positive_amount() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a, b], false);
        let err = aggregator.get_best_route(&weth(), &usdt(), Decimal::ZERO).await.unwrap_err();
        assert_eq!(err, DexError::InvalidAmount(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_and_multi_hop_routes() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a, b], true);
        let mut route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();

        let hop = route.hops[0].clone();
        route.hops.clear();
        assert_eq!(aggregator.execute_trade(&route).await.unwrap_err(), DexError::EmptyRoute);

        route.hops = vec![hop.clone(), hop];
        assert_eq!(
            aggregator.execute_trade(&route).await.unwrap_err(),
            DexError::UnsupportedMultiHop { hops: 2 }
        );
    }

    #[tokio::test]
    async fn test_end_to_end_route_and_simulated_execution() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a.clone(), b], true);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        assert_eq!(route.hops.len(), 1);
        assert_eq!(route.hops[0].venue, "uniswap");

        let trade = aggregator.execute_trade(&route).await.unwrap();
        assert_eq!(trade.amount, dec!(1));
        assert_eq!(trade.side, OrderSide::Sell);
        assert_eq!(trade.status, TradeStatus::Pending);
        assert!(!trade.status.is_terminal());
        assert_eq!(trade.metadata["simulated"], "true");

        let order = a.get_order_status(trade.order_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_execute_buy_side_when_spending_token1() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a, b], true);

        let route = aggregator.get_best_route(&usdt(), &weth(), dec!(1800)).await.unwrap();
        let trade = aggregator.execute_trade(&route).await.unwrap();
        assert_eq!(trade.side, OrderSide::Buy);
        assert_eq!(trade.amount, dec!(1800));
    }

    #[tokio::test]
    async fn test_execute_without_simulation_requires_fill() {
        let (a, b) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![a.clone(), b], false);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        let err = aggregator.execute_trade(&route).await.unwrap_err();
        assert_eq!(err.code(), "ORDER_PLACEMENT_FAILED");
    }

    #[tokio::test]
    async fn test_execute_returns_venue_fill() {
        let filling = Arc::new(
            MockVenue::new("uniswap")
                .with_pool(weth(), usdt(), dec!(950), dec!(1762487.5))
                .with_auto_fill(),
        );
        let (_, other) = two_weth_usdt_venues();
        let aggregator = aggregator_with(vec![filling.clone(), other], false);

        let route = aggregator.get_best_route(&weth(), &usdt(), dec!(1)).await.unwrap();
        let trade = aggregator.execute_trade(&route).await.unwrap();

        assert_eq!(trade.status, TradeStatus::Confirmed);
        assert!(!trade.metadata.contains_key("simulated"));
        assert_eq!(trade.amount, dec!(1));
        // 1_762_487.5 / 951, the same fill the route quoted
        assert!((trade.price - route.expected_amount_out).abs() < dec!(0.000001));

        let order = filling.get_order_status(trade.order_id.as_deref().unwrap()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_register_replaces_same_name() {
        let (a, _) = two_weth_usdt_venues();
        let replacement = Arc::new(MockVenue::new("uniswap").with_pool(weth(), dai(), dec!(1), dec!(1800)));
        let aggregator = aggregator_with(vec![a, replacement], false);

        assert_eq!(aggregator.get_supported_dexes(), vec!["uniswap"]);
        assert!(aggregator.find_token_pairs(&weth(), &usdt()).await.unwrap().is_empty());
    }
}
