//! subgraph_venue.rs - Uniswap V2 style venues backed by a subgraph
//!
//! Pairs, tokens, reserves and swap history come from the venue's subgraph
//! (GraphQL over HTTP); balances come from the chain via JSON-RPC `eth_call`.
//! Orders are tracked locally and never signed or broadcast here.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::VenueCache;
use crate::config::DexConfig;
use crate::error::{DexError, Result};
use crate::models::{Order, OrderKind, OrderSide, Pair, Token, Trade, TradeStatus};
use crate::order_book::{self, OrderBook};
use crate::pricing;
use crate::venue::DexAdapter;

const RESERVES_TTL: Duration = Duration::from_secs(10);
const LISTING_TTL: Duration = Duration::from_secs(300);

/// `balanceOf(address)` selector
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// Protocol flavour; both share the Uniswap V2 subgraph schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphProtocol {
    UniswapV2,
    Sushiswap,
}

impl SubgraphProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubgraphProtocol::UniswapV2 => "uniswap_v2",
            SubgraphProtocol::Sushiswap => "sushiswap",
        }
    }

    fn default_subgraph_url(&self) -> &'static str {
        match self {
            SubgraphProtocol::UniswapV2 => "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v2",
            SubgraphProtocol::Sushiswap => "https://api.thegraph.com/subgraphs/name/sushiswap/exchange",
        }
    }
}

// ============================================================================
// Subgraph / JSON-RPC Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PairsData {
    pairs: Vec<PairData>,
}

#[derive(Debug, Deserialize)]
struct PairData {
    id: String,
    token0: TokenData,
    token1: TokenData,
}

#[derive(Debug, Deserialize)]
struct TokensData {
    tokens: Vec<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    id: String,
    symbol: String,
    name: String,
    decimals: String,
}

#[derive(Debug, Deserialize)]
struct ReservesData {
    pair: Option<ReservesPair>,
}

#[derive(Debug, Deserialize)]
struct ReservesPair {
    reserve0: String,
    reserve1: String,
}

#[derive(Debug, Deserialize)]
struct SwapsData {
    swaps: Vec<SwapData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapData {
    id: String,
    timestamp: String,
    transaction: TransactionRef,
    amount0_in: String,
    amount1_in: String,
    amount0_out: String,
    amount1_out: String,
}

#[derive(Debug, Deserialize)]
struct TransactionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

const PAIRS_QUERY: &str = "query($first: Int!) { pairs(first: $first, orderBy: reserveUSD, orderDirection: desc) { \
    id token0 { id symbol name decimals } token1 { id symbol name decimals } } }";

const TOKENS_QUERY: &str = "query($first: Int!) { tokens(first: $first, orderBy: tradeVolumeUSD, orderDirection: desc) { \
    id symbol name decimals } }";

const RESERVES_QUERY: &str = "query($id: ID!) { pair(id: $id) { reserve0 reserve1 } }";

const SWAPS_QUERY: &str = "query($pair: String!, $first: Int!, $from: BigInt!) { swaps(first: $first, \
    orderBy: timestamp, orderDirection: desc, where: { pair: $pair, timestamp_gte: $from }) { \
    id timestamp transaction { id } amount0In amount1In amount0Out amount1Out } }";

#[derive(Debug, Clone)]
enum CachedData {
    Pairs(Vec<Pair>),
    Tokens(Vec<Token>),
    Reserves(Decimal, Decimal),
}

// ============================================================================
// SubgraphVenue
// ============================================================================

/// Live venue adapter for Uniswap V2 and its forks
#[derive(Debug)]
pub struct SubgraphVenue {
    config: DexConfig,
    protocol: SubgraphProtocol,
    client: Client,
    subgraph_url: String,
    fee_rate: Decimal,
    cache: VenueCache<CachedData>,
    orders: OrderBook,
}

impl SubgraphVenue {
    pub fn uniswap_v2(config: DexConfig) -> Result<Self> {
        Self::new(config, SubgraphProtocol::UniswapV2)
    }

    pub fn sushiswap(config: DexConfig) -> Result<Self> {
        Self::new(config, SubgraphProtocol::Sushiswap)
    }

    pub fn new(config: DexConfig, protocol: SubgraphProtocol) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DexError::venue(&config.venue_name, format!("failed to create HTTP client: {}", e)))?;

        let subgraph_url = config
            .extra
            .get("subgraph_url")
            .cloned()
            .unwrap_or_else(|| protocol.default_subgraph_url().to_string());

        let fee_rate = match config.extra.get("fee_rate") {
            Some(raw) => parse_decimal(raw)
                .map_err(|e| DexError::venue(&config.venue_name, format!("invalid fee_rate: {}", e)))?,
            None => Decimal::new(3, 3),
        };

        info!(
            "{} adapter ready ({}, chain {}, subgraph {})",
            config.venue_name,
            protocol.as_str(),
            config.chain_id,
            subgraph_url
        );

        Ok(SubgraphVenue {
            config,
            protocol,
            client,
            subgraph_url,
            fee_rate,
            cache: VenueCache::new(),
            orders: OrderBook::new(),
        })
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let venue = self.config.venue_name.as_str();
        debug!("{}: subgraph query {}", venue, query.split('{').nth(1).unwrap_or(query).trim());

        let mut request = self
            .client
            .post(&self.subgraph_url)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(key) = self.config.api_key() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        if !response.status().is_success() {
            return Err(DexError::venue(venue, format!("subgraph returned status {}", response.status())));
        }

        let body: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| DexError::venue(venue, format!("failed to parse subgraph response: {}", e)))?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(DexError::venue(venue, messages.join("; ")));
        }
        body.data
            .ok_or_else(|| DexError::venue(venue, "subgraph response has no data"))
    }

    fn transport_error(&self, e: reqwest::Error) -> DexError {
        if e.is_timeout() {
            DexError::VenueTimeout {
                venue: self.config.venue_name.clone(),
                timeout: self.config.request_timeout(),
            }
        } else {
            DexError::venue(&self.config.venue_name, e.to_string())
        }
    }

    async fn reserves(&self, pair: &Pair) -> Result<(Decimal, Decimal)> {
        let key = format!("reserves_{}", pair.id.to_lowercase());
        if let Some(CachedData::Reserves(r0, r1)) = self.cache.get(&key, RESERVES_TTL).await {
            return Ok((r0, r1));
        }

        let data: ReservesData = self
            .query(RESERVES_QUERY, json!({ "id": pair.id.to_lowercase() }))
            .await?;
        let raw = data.pair.ok_or_else(|| DexError::PairNotFound(pair.id.clone()))?;
        let venue = self.config.venue_name.as_str();
        let reserve0 = parse_decimal(&raw.reserve0).map_err(|e| DexError::venue(venue, e))?;
        let reserve1 = parse_decimal(&raw.reserve1).map_err(|e| DexError::venue(venue, e))?;

        self.cache.set(key, CachedData::Reserves(reserve0, reserve1)).await;
        Ok((reserve0, reserve1))
    }

    async fn eth_call(&self, to: &str, data: String) -> Result<String> {
        let venue = self.config.venue_name.as_str();
        if self.config.rpc_endpoint.is_empty() {
            return Err(DexError::venue(venue, "no rpc_endpoint configured"));
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": to, "data": data }, "latest"],
        });
        let response = self
            .client
            .post(&self.config.rpc_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| DexError::venue(venue, format!("failed to parse RPC response: {}", e)))?;
        if let Some(err) = rpc.error {
            return Err(DexError::venue(venue, format!("RPC error {}: {}", err.code, err.message)));
        }
        rpc.result.ok_or_else(|| DexError::venue(venue, "RPC response has no result"))
    }
}

#[async_trait]
impl DexAdapter for SubgraphVenue {
    fn name(&self) -> &str {
        &self.config.venue_name
    }

    fn config(&self) -> &DexConfig {
        &self.config
    }

    async fn get_price(&self, pair: &Pair) -> Result<Decimal> {
        let (reserve0, reserve1) = self.reserves(pair).await?;
        pricing::spot_price(&pair.id, reserve0, reserve1)
    }

    async fn get_liquidity(&self, pair: &Pair) -> Result<(Decimal, Decimal)> {
        self.reserves(pair).await
    }

    async fn create_order(
        &self,
        pair: &Pair,
        kind: OrderKind,
        side: OrderSide,
        amount: Decimal,
        limit_price: Decimal,
    ) -> Result<Order> {
        let reserves = self.reserves(pair).await?;
        let order = order_book::new_amm_order(&self.config, pair, kind, side, amount, limit_price, reserves)?;
        info!(
            "{}: {} {} order {} for {} on {}",
            self.config.venue_name,
            kind,
            side,
            order.id,
            amount,
            pair.symbol()
        );
        Ok(self.orders.insert(order).await)
    }

    async fn cancel_order(&self, order: &Order) -> Result<bool> {
        Ok(self.orders.cancel(&order.id).await)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<Order> {
        self.orders.get(&self.config.venue_name, order_id).await
    }

    async fn get_trades(
        &self,
        pair: &Pair,
        limit: usize,
        from_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>> {
        let from = from_time.map(|t| t.timestamp()).unwrap_or(0).max(0);
        let data: SwapsData = self
            .query(
                SWAPS_QUERY,
                json!({ "pair": pair.id.to_lowercase(), "first": limit, "from": from.to_string() }),
            )
            .await?;

        let mut trades = Vec::with_capacity(data.swaps.len());
        for swap in data.swaps {
            match convert_swap(swap, pair) {
                Ok(trade) => trades.push(trade),
                Err(e) => debug!("{}: skipped swap: {}", self.config.venue_name, e),
            }
        }
        trades.truncate(limit);
        Ok(trades)
    }

    async fn get_pairs(&self, limit: usize) -> Result<Vec<Pair>> {
        let key = format!("pairs_{}", limit);
        if let Some(CachedData::Pairs(pairs)) = self.cache.get(&key, LISTING_TTL).await {
            return Ok(pairs);
        }

        let data: PairsData = self.query(PAIRS_QUERY, json!({ "first": limit })).await?;
        let pairs: Vec<Pair> = data
            .pairs
            .into_iter()
            .filter_map(|raw| {
                convert_pair(raw, self.config.chain_id, self.fee_rate, self.protocol)
                    .map_err(|e| debug!("{}: skipped pair: {}", self.config.venue_name, e))
                    .ok()
            })
            .collect();

        info!("{}: {} pairs listed", self.config.venue_name, pairs.len());
        self.cache.set(key, CachedData::Pairs(pairs.clone())).await;
        Ok(pairs)
    }

    async fn get_tokens(&self, limit: usize) -> Result<Vec<Token>> {
        let key = format!("tokens_{}", limit);
        if let Some(CachedData::Tokens(tokens)) = self.cache.get(&key, LISTING_TTL).await {
            return Ok(tokens);
        }

        let data: TokensData = self.query(TOKENS_QUERY, json!({ "first": limit })).await?;
        let tokens: Vec<Token> = data
            .tokens
            .into_iter()
            .filter_map(|raw| convert_token(raw, self.config.chain_id).ok())
            .collect();

        self.cache.set(key, CachedData::Tokens(tokens.clone())).await;
        Ok(tokens)
    }

    async fn get_balance(&self, token: &Token, address: Option<&str>) -> Result<Decimal> {
        let venue = self.config.venue_name.as_str();
        let owner = address
            .filter(|a| !a.is_empty())
            .or_else(|| self.config.wallet_address())
            .ok_or_else(|| DexError::venue(venue, "no wallet address configured"))?;

        let data = balance_of_calldata(owner).map_err(|e| DexError::venue(venue, e))?;
        let raw = self.eth_call(&token.address, data).await?;
        scale_balance(&raw, token.decimals).map_err(|e| DexError::venue(venue, e))
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn parse_decimal(raw: &str) -> std::result::Result<Decimal, String> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("invalid decimal '{}': {}", raw, e))
}

fn convert_token(data: TokenData, chain_id: u64) -> std::result::Result<Token, String> {
    let decimals: u8 = data
        .decimals
        .parse()
        .map_err(|_| format!("invalid decimals '{}' for {}", data.decimals, data.symbol))?;
    Ok(Token::new(&data.id, &data.symbol, &data.name, decimals, chain_id))
}

fn convert_pair(
    data: PairData,
    chain_id: u64,
    fee_rate: Decimal,
    protocol: SubgraphProtocol,
) -> std::result::Result<Pair, String> {
    let token0 = convert_token(data.token0, chain_id)?;
    let token1 = convert_token(data.token1, chain_id)?;
    Ok(Pair::new(&data.id, token0, token1, fee_rate, protocol.as_str()))
}

/// Token0 in means the swap sold token0; amounts are in the spent token
fn convert_swap(data: SwapData, pair: &Pair) -> std::result::Result<Trade, String> {
    let amount0_in = parse_decimal(&data.amount0_in)?;
    let amount1_in = parse_decimal(&data.amount1_in)?;
    let amount0_out = parse_decimal(&data.amount0_out)?;
    let amount1_out = parse_decimal(&data.amount1_out)?;

    let (side, amount, price) = if amount0_in > Decimal::ZERO && amount1_out > Decimal::ZERO {
        (OrderSide::Sell, amount0_in, amount1_out.checked_div(amount0_in))
    } else if amount1_in > Decimal::ZERO && amount0_out > Decimal::ZERO {
        (OrderSide::Buy, amount1_in, amount1_in.checked_div(amount0_out))
    } else {
        return Err(format!("swap {} has no usable amounts", data.id));
    };
    let price = price.ok_or_else(|| format!("swap {} price out of range", data.id))?;

    let seconds: i64 = data
        .timestamp
        .parse()
        .map_err(|_| format!("invalid timestamp '{}'", data.timestamp))?;
    let timestamp = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| format!("timestamp out of range: {}", seconds))?;

    Ok(Trade {
        id: data.id,
        order_id: None,
        pair: pair.clone(),
        side,
        amount,
        price,
        fee: amount.saturating_mul(pair.fee_rate),
        status: TradeStatus::Confirmed,
        timestamp,
        tx_hash: Some(data.transaction.id),
        metadata: HashMap::new(),
    })
}

fn balance_of_calldata(owner: &str) -> std::result::Result<String, String> {
    let hex = owner.trim_start_matches("0x").to_lowercase();
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid address '{}'", owner));
    }
    Ok(format!("0x{}{:0>64}", BALANCE_OF_SELECTOR, hex))
}

fn scale_balance(raw: &str, decimals: u8) -> std::result::Result<Decimal, String> {
    let hex = raw.trim_start_matches("0x").trim_start_matches('0');
    if hex.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = u128::from_str_radix(hex, 16).map_err(|e| format!("invalid balance '{}': {}", raw, e))?;
    let value = i128::try_from(value).map_err(|_| format!("balance overflows: {}", raw))?;
    Decimal::try_from_i128_with_scale(value, decimals as u32)
        .map_err(|e| format!("balance {} not representable: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn token_data(id: &str, symbol: &str, decimals: &str) -> TokenData {
        TokenData {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals: decimals.to_string(),
        }
    }

    fn sample_pair() -> Pair {
        convert_pair(
            PairData {
                id: "0x0d4a11d5eeaac28ec3f61d100daf4d40471f1852".to_string(),
                token0: token_data("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2", "WETH", "18"),
                token1: token_data("0xdac17f958d2ee523a2206206994597c13d831ec7", "USDT", "6"),
            },
            1,
            dec!(0.003),
            SubgraphProtocol::UniswapV2,
        )
        .unwrap()
    }

    fn swap(a0_in: &str, a1_in: &str, a0_out: &str, a1_out: &str) -> SwapData {
        SwapData {
            id: "0xtx-0".to_string(),
            timestamp: "1700000000".to_string(),
            transaction: TransactionRef { id: "0xtx".to_string() },
            amount0_in: a0_in.to_string(),
            amount1_in: a1_in.to_string(),
            amount0_out: a0_out.to_string(),
            amount1_out: a1_out.to_string(),
        }
    }

    #[test]
    fn test_convert_pair() {
        let pair = sample_pair();
        assert_eq!(pair.symbol(), "WETH/USDT");
        assert_eq!(pair.token1.decimals, 6);
        assert_eq!(pair.protocol, "uniswap_v2");
    }

    #[test]
    fn test_convert_pair_rejects_bad_decimals() {
        let raw = PairData {
            id: "0xp".to_string(),
            token0: token_data("0xa", "AAA", "eighteen"),
            token1: token_data("0xb", "BBB", "18"),
        };
        assert!(convert_pair(raw, 1, dec!(0.003), SubgraphProtocol::Sushiswap).is_err());
    }

    #[test]
    fn test_convert_sell_and_buy_swaps() {
        let pair = sample_pair();

        let sell = convert_swap(swap("2", "0", "0", "3600"), &pair).unwrap();
        assert_eq!(sell.side, OrderSide::Sell);
        assert_eq!(sell.amount, dec!(2));
        assert_eq!(sell.price, dec!(1800));
        assert_eq!(sell.fee, dec!(0.006));
        assert_eq!(sell.tx_hash.as_deref(), Some("0xtx"));

        let buy = convert_swap(swap("0", "1810", "1", "0"), &pair).unwrap();
        assert_eq!(buy.side, OrderSide::Buy);
        assert_eq!(buy.price, dec!(1810));

        assert!(convert_swap(swap("0", "0", "0", "0"), &pair).is_err());
        // 1e20 / 1e-10 does not fit in a Decimal
        assert!(convert_swap(swap("0.0000000001", "0", "0", "100000000000000000000"), &pair).is_err());
    }

    #[test]
    fn test_subgraph_response_parsing() {
        let body = r#"{"data":{"pair":{"reserve0":"950.5","reserve1":"1762487.5"}}}"#;
        let parsed: GraphQlResponse<ReservesData> = serde_json::from_str(body).unwrap();
        let pair = parsed.data.unwrap().pair.unwrap();
        assert_eq!(parse_decimal(&pair.reserve0).unwrap(), dec!(950.5));

        let body = r#"{"errors":[{"message":"indexing error"}]}"#;
        let parsed: GraphQlResponse<ReservesData> = serde_json::from_str(body).unwrap();
        assert!(parsed.data.is_none());
        assert_eq!(parsed.errors.unwrap()[0].message, "indexing error");
    }

    #[test]
    fn test_balance_calldata_and_scaling() {
        let data = balance_of_calldata("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B").unwrap();
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.starts_with("0x70a08231000000000000000000000000ab5801a7"));
        assert!(balance_of_calldata("0x1234").is_err());

        // 1.5 * 10^18
        assert_eq!(scale_balance("0x00000000000000000000000000000000000000000000000014d1120d7b160000", 18).unwrap(), dec!(1.5));
        assert_eq!(scale_balance("0x0", 6).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_fee_rate_override() {
        let mut config = DexConfig::new("sushi", crate::config::VenueKind::Sushiswap);
        config.extra.insert("fee_rate".to_string(), "0.0025".to_string());
        let venue = SubgraphVenue::sushiswap(config).unwrap();
        assert_eq!(venue.fee_rate, dec!(0.0025));
        assert_eq!(venue.subgraph_url, SubgraphProtocol::Sushiswap.default_subgraph_url());
    }
}
