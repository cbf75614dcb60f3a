//! DEX Aggregation and Routing Engine
//!
//! Discovers, prices and executes token swaps across independent DEX venues
//! without venue-specific logic in calling code.
//!
//! # Features
//! - `DexAdapter` capability contract with Uniswap V2 and Sushiswap adapters
//! - Concurrent fan-out across venues with per-venue timeouts and caller deadlines
//! - Constant-product pricing and price impact simulation
//! - Best price and best single-hop route selection with deterministic tie-breaks
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Aggregator                       │
//! │  - find_token_pairs()    - get_best_route()          │
//! │  - get_best_price()      - execute_trade()           │
//! └──────────────┬──────────────────────────┬───────────┘
//!                │ fan-out / fan-in         │ simulate
//!                ▼                          ▼
//! ┌─────────────────────────────┐  ┌─────────────────────┐
//! │      DexAdapter Trait        │  │   Pricing Engine    │
//! │  get_price / get_liquidity   │  │  (constant product) │
//! │  create_order / get_trades   │  └─────────────────────┘
//! └──────────────┬──────────────┘
//!                │
//!        ┌───────┴───────────────┐
//!        ▼                       ▼
//! ┌─────────────────┐   ┌─────────────────┐
//! │  SubgraphVenue  │   │    MockVenue    │
//! │  (Production)   │   │    (Testing)    │
//! └─────────────────┘   └─────────────────┘
//! ```

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod gas;
pub mod mock_venue;
pub mod models;
pub mod order_book;
pub mod pricing;
pub mod subgraph_venue;
pub mod venue;

// Re-export commonly used types
pub use aggregator::{Aggregator, BestPrice, PairListing};
pub use cache::VenueCache;
pub use config::{AggregatorConfig, AppConfig, Credentials, DexConfig, VenueKind};
pub use error::{DexError, Result};
pub use gas::{GasEstimator, StaticGasEstimator};
pub use mock_venue::MockVenue;
pub use models::{
    Order,
    OrderKind,
    OrderSide,
    OrderStatus,
    Pair,
    RouteHop,
    Token,
    Trade,
    TradeRoute,
    TradeStatus,
};
pub use pricing::{SwapDirection, SwapQuote};
pub use subgraph_venue::{SubgraphProtocol, SubgraphVenue};
pub use venue::{build_venue, create_order_by_symbol, DexAdapter};

/// Version of the aggregation engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the package
pub const NAME: &str = env!("CARGO_PKG_NAME");
