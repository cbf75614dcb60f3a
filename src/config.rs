//! config.rs - Venue and aggregator configuration
//!
//! Loaded once from a TOML file; every adapter receives its `DexConfig` at
//! construction and treats it as read-only afterwards.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Which adapter implementation serves a venue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    UniswapV2,
    Sushiswap,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Per-venue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexConfig {
    pub venue_name: String,
    pub kind: VenueKind,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default)]
    pub rpc_endpoint: String,
    #[serde(default)]
    pub router_address: String,
    #[serde(default)]
    pub factory_address: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Native token per gas unit
    #[serde(default = "default_gas_price_hint")]
    pub gas_price_hint: Decimal,
    /// Percent, e.g. 0.5 = 0.5%
    #[serde(default = "default_max_slippage")]
    pub max_slippage: Decimal,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

fn default_chain_id() -> u64 {
    1
}

fn default_gas_limit() -> u64 {
    150_000
}

fn default_gas_price_hint() -> Decimal {
    // 20 gwei
    Decimal::new(20, 9)
}

fn default_max_slippage() -> Decimal {
    Decimal::new(5, 1)
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl DexConfig {
    /// Minimal config with defaults for everything but name and kind
    pub fn new(venue_name: &str, kind: VenueKind) -> Self {
        DexConfig {
            venue_name: venue_name.to_string(),
            kind,
            chain_id: default_chain_id(),
            rpc_endpoint: String::new(),
            router_address: String::new(),
            factory_address: String::new(),
            credentials: None,
            gas_limit: default_gas_limit(),
            gas_price_hint: default_gas_price_hint(),
            max_slippage: default_max_slippage(),
            request_timeout_ms: default_request_timeout_ms(),
            extra: HashMap::new(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn wallet_address(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .map(|c| c.wallet_address.as_str())
            .filter(|a| !a.is_empty())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.credentials.as_ref().and_then(|c| c.api_key.as_deref())
    }
}

/// Aggregator-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_pair_cache_ttl_secs")]
    pub pair_cache_ttl_secs: u64,
    #[serde(default = "default_pair_scan_limit")]
    pub pair_scan_limit: usize,
    #[serde(default = "default_trade_lookup_limit")]
    pub trade_lookup_limit: usize,
    #[serde(default = "default_query_budget_ms")]
    pub query_budget_ms: u64,
    /// Synthesize a pending trade when a venue reports no fill for a fresh order
    #[serde(default)]
    pub simulate: bool,
}

fn default_pair_cache_ttl_secs() -> u64 {
    60
}

fn default_pair_scan_limit() -> usize {
    1000
}

fn default_trade_lookup_limit() -> usize {
    20
}

fn default_query_budget_ms() -> u64 {
    10_000
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            pair_cache_ttl_secs: default_pair_cache_ttl_secs(),
            pair_scan_limit: default_pair_scan_limit(),
            trade_lookup_limit: default_trade_lookup_limit(),
            query_budget_ms: default_query_budget_ms(),
            simulate: false,
        }
    }
}

impl AggregatorConfig {
    pub fn pair_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.pair_cache_ttl_secs)
    }

    pub fn query_budget(&self) -> Duration {
        Duration::from_millis(self.query_budget_ms)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub venues: Vec<DexConfig>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        if config.venues.is_empty() {
            anyhow::bail!("No venues configured");
        }
        Ok(config)
    }
}
