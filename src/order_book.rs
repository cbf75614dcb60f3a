//! order_book.rs - Orders placed through an AMM adapter
//!
//! Each adapter owns one `OrderBook`; status changes only happen here.
//! Order amounts are denominated in the token being spent: token0 for sells,
//! token1 for buys.

use chrono::{Duration, Utc};
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::DexConfig;
use crate::error::{DexError, Result};
use crate::models::{Order, OrderKind, OrderSide, OrderStatus, Pair};
use crate::pricing::{self, SwapDirection};

/// Finished orders older than this are dropped on the next insert
const TERMINAL_RETENTION_HOURS: i64 = 24;

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: Order) -> Order {
        let mut orders = self.orders.write().await;
        let cutoff = Utc::now() - Duration::hours(TERMINAL_RETENTION_HOURS);
        let before = orders.len();
        orders.retain(|_, o| !o.status.is_terminal() || o.created_at >= cutoff);
        if orders.len() < before {
            debug!("Pruned {} finished orders", before - orders.len());
        }
        orders.insert(order.id.clone(), order.clone());
        order
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn get(&self, venue: &str, order_id: &str) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| DexError::venue(venue, format!("unknown order {}", order_id)))
    }

    /// Cancels a non-terminal order; false if it already finished or is unknown
    pub async fn cancel(&self, order_id: &str) -> bool {
        let mut orders = self.orders.write().await;
        match orders.get_mut(order_id) {
            Some(order) if !order.status.is_terminal() => {
                order.status = OrderStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    pub async fn set_status(&self, order_id: &str, status: OrderStatus) {
        if let Some(order) = self.orders.write().await.get_mut(order_id) {
            order.status = status;
        }
    }
}

/// Validate and quote a new order against the pool's current reserves
pub fn new_amm_order(
    config: &DexConfig,
    pair: &Pair,
    kind: OrderKind,
    side: OrderSide,
    amount: Decimal,
    limit_price: Decimal,
    reserves: (Decimal, Decimal),
) -> Result<Order> {
    let venue = config.venue_name.as_str();
    if amount <= Decimal::ZERO {
        return Err(DexError::InvalidAmount(amount));
    }
    match kind {
        OrderKind::StopLimit | OrderKind::StopMarket => {
            return Err(DexError::NotImplemented {
                capability: format!("create_order({})", kind),
                venue: venue.to_string(),
            });
        }
        OrderKind::Limit if limit_price <= Decimal::ZERO => {
            return Err(DexError::OrderPlacementFailed {
                venue: venue.to_string(),
                reason: "limit order requires a positive limit price".to_string(),
            });
        }
        _ => {}
    }

    let direction = match side {
        OrderSide::Sell => SwapDirection::SellToken0,
        OrderSide::Buy => SwapDirection::BuyToken0,
    };
    let quote = pricing::calculate_output_amount(&pair.id, reserves.0, reserves.1, amount, direction)?;
    let min_out = pricing::min_amount_out(quote.amount_out, config.max_slippage);

    let mut order = Order::new(pair.clone(), kind, side, amount, limit_price);
    order.metadata.insert("venue".to_string(), venue.to_string());
    order.metadata.insert("router".to_string(), config.router_address.clone());
    order.metadata.insert("spot_price".to_string(), quote.spot_price.to_string());
    order.metadata.insert("quoted_amount_out".to_string(), quote.amount_out.to_string());
    order.metadata.insert("min_amount_out".to_string(), min_out.to_string());
    Ok(order)
}
