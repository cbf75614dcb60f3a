//! error.rs - Error taxonomy for the aggregation engine
//!
//! Per-venue failures (`VenueTimeout`, `VenueError`) are recovered during
//! fan-out; everything else is raised to the caller.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by adapters, the pricing engine and the aggregator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DexError {
    #[error("No venue lists a tradable pair for {token_in} -> {token_out}")]
    NoPairsFound { token_in: String, token_out: String },

    #[error("Pair {pair} has zero or invalid reserves")]
    IlliquidPair { pair: String },

    #[error("Pair not found: {0}")]
    PairNotFound(String),

    #[error("Capability '{capability}' is not implemented by venue '{venue}'")]
    NotImplemented { capability: String, venue: String },

    #[error("Route has no hops")]
    EmptyRoute,

    #[error("Route has {hops} hops; only single-hop routes are supported")]
    UnsupportedMultiHop { hops: usize },

    #[error("Venue '{venue}' timed out after {timeout:?}")]
    VenueTimeout { venue: String, timeout: Duration },

    #[error("Venue '{venue}' failed: {message}")]
    VenueError { venue: String, message: String },

    #[error("Order placement on '{venue}' failed: {reason}")]
    OrderPlacementFailed { venue: String, reason: String },

    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Decimal),
}

impl DexError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            DexError::NoPairsFound { .. } => "NO_PAIRS_FOUND",
            DexError::IlliquidPair { .. } => "ILLIQUID_PAIR",
            DexError::PairNotFound(_) => "PAIR_NOT_FOUND",
            DexError::NotImplemented { .. } => "NOT_IMPLEMENTED",
            DexError::EmptyRoute => "EMPTY_ROUTE",
            DexError::UnsupportedMultiHop { .. } => "UNSUPPORTED_MULTI_HOP",
            DexError::VenueTimeout { .. } => "VENUE_TIMEOUT",
            DexError::VenueError { .. } => "VENUE_ERROR",
            DexError::OrderPlacementFailed { .. } => "ORDER_PLACEMENT_FAILED",
            DexError::InvalidAmount(_) => "INVALID_AMOUNT",
        }
    }

    /// True for failures scoped to a single venue, which fan-out recovers from
    pub fn is_venue_local(&self) -> bool {
        matches!(self, DexError::VenueTimeout { .. } | DexError::VenueError { .. })
    }

    pub(crate) fn venue(venue: &str, message: impl Into<String>) -> Self {
        DexError::VenueError {
            venue: venue.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DexError>;
