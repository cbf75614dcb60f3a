//! models.rs - Core data structures for the aggregation engine
//!
//! Token, Pair, Order, Trade and TradeRoute value types shared by every venue
//! adapter and the aggregator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Represents a token on a specific chain
///
/// Identity is `(address, chain_id)`; addresses compare case-insensitively so
/// checksummed and lowercase forms refer to the same token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub chain_id: u64,
}

impl Token {
    pub fn new(address: &str, symbol: &str, name: &str, decimals: u8, chain_id: u64) -> Self {
        Token {
            address: address.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            chain_id,
        }
    }

    /// Token known only by its address, e.g. from command-line input
    pub fn from_address(address: &str, chain_id: u64) -> Self {
        Token::new(address, "", "", 18, chain_id)
    }

    /// Normalized address used for identity and cache keys
    pub fn address_key(&self) -> String {
        self.address.to_lowercase()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address.eq_ignore_ascii_case(&other.address)
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address_key().hash(state);
        self.chain_id.hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.symbol.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{}", self.symbol)
        }
    }
}

/// A liquidity pool on a venue
///
/// Stored undirected; price and amount calculations always state whether they
/// run token0 -> token1 or the inverse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pair {
    pub id: String,
    pub token0: Token,
    pub token1: Token,
    pub fee_rate: Decimal,
    pub protocol: String,
}

impl Pair {
    pub fn new(id: &str, token0: Token, token1: Token, fee_rate: Decimal, protocol: &str) -> Self {
        Pair {
            id: id.to_string(),
            token0,
            token1,
            fee_rate,
            protocol: protocol.to_string(),
        }
    }

    /// Returns the symbol identifier (e.g., "WETH/USDT")
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.token0.symbol, self.token1.symbol)
    }

    /// True if the pair trades exactly these two tokens, in either order
    pub fn connects(&self, a: &Token, b: &Token) -> bool {
        (self.token0 == *a && self.token1 == *b) || (self.token0 == *b && self.token1 == *a)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.symbol(), self.protocol, self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
    StopLimit,
    StopMarket,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
            OrderKind::StopLimit => "stop-limit",
            OrderKind::StopMarket => "stop-market",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// An order placed on a single venue
///
/// Only the owning adapter advances `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub pair: Pair,
    pub kind: OrderKind,
    pub side: OrderSide,
    pub amount: Decimal,
    pub limit_price: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Order {
    pub fn new(pair: Pair, kind: OrderKind, side: OrderSide, amount: Decimal, limit_price: Decimal) -> Self {
        Order {
            id: uuid::Uuid::new_v4().to_string(),
            pair,
            kind,
            side,
            amount,
            limit_price,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            tx_hash: None,
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }
}

/// A (partial) fill of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub order_id: Option<String>,
    pub pair: Pair,
    pub side: OrderSide,
    pub amount: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub status: TradeStatus,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// One (venue, pair) traversal of a route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteHop {
    pub venue: String,
    pub pair: Pair,
}

/// Aggregator-computed route; recomputed on every quote, never persisted
///
/// `hops` holds at most one entry: execution rejects multi-hop routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRoute {
    pub hops: Vec<RouteHop>,
    pub token_in: Token,
    pub token_out: Token,
    pub amount_in: Decimal,
    pub expected_amount_out: Decimal,
    pub price_impact: Decimal,
    pub estimated_gas: Decimal,
}

impl TradeRoute {
    /// Format the route as a string (e.g., "WETH -[uniswap]-> USDT")
    pub fn format_path(&self) -> String {
        let mut path = self.token_in.to_string();
        for hop in &self.hops {
            let next = if hop.pair.token0 == self.token_in {
                &hop.pair.token1
            } else {
                &hop.pair.token0
            };
            path.push_str(&format!(" -[{}]-> {}", hop.venue, next));
        }
        path
    }
}

impl fmt::Display for TradeRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | in {} out {} | impact {:.4}% | gas {}",
            self.format_path(),
            self.amount_in,
            self.expected_amount_out,
            self.price_impact,
            self.estimated_gas
        )
    }
}
