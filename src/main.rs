//! main.rs - Entry point for the DEX aggregator
//!
//! Loads venue configuration, registers every venue, prints the best price
//! and route for a token pair and optionally places the order.

use clap::Parser;
use dex_aggregator::{Aggregator, AppConfig, DexError, Token, NAME, VERSION};
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dex-aggregator", version, about = "Best route across DEX venues")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Address of the token to spend
    #[arg(long)]
    token_in: String,

    /// Address of the token to receive
    #[arg(long)]
    token_out: String,

    /// Amount of token_in to spend
    #[arg(long)]
    amount: Decimal,

    /// Chain id both tokens live on
    #[arg(long, default_value_t = 1)]
    chain_id: u64,

    /// Place the order on the winning venue
    #[arg(long)]
    execute: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    println!();
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║     DEX Aggregator v{:<37}║", VERSION);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    info!("Starting {} v{}", NAME, VERSION);

    let config = AppConfig::load(&args.config)?;
    let aggregator = Aggregator::from_app_config(&config)?;

    let venues = aggregator.get_supported_dexes();
    info!("✓ {} venues registered: {}", venues.len(), venues.join(", "));
    if config.aggregator.simulate {
        warn!("Simulation enabled: unconfirmed orders produce synthesized trades");
    }

    let token_in = Token::from_address(&args.token_in, args.chain_id);
    let token_out = Token::from_address(&args.token_out, args.chain_id);

    match aggregator.get_best_price(&token_in, &token_out).await {
        Ok(best) => info!(
            "💡 Best spot price: {} on {} ({})",
            best.price,
            best.venue,
            best.pair.symbol()
        ),
        Err(e) => warn!("No spot price available: {} [{}]", e, e.code()),
    }

    let route = match aggregator.get_best_route(&token_in, &token_out, args.amount).await {
        Ok(route) => route,
        Err(e) => {
            error!("✗ Route lookup failed: {} [{}]", e, e.code());
            return Err(e.into());
        }
    };

    println!();
    println!("Route:          {}", route.format_path());
    println!("Amount in:      {} {}", route.amount_in, route.token_in);
    println!("Expected out:   {} {}", route.expected_amount_out, route.token_out);
    println!("Price impact:   {:.4}%", route.price_impact);
    println!("Estimated gas:  {}", route.estimated_gas);
    println!();

    if !args.execute {
        info!("Dry run complete (pass --execute to place the order)");
        return Ok(());
    }

    match aggregator.execute_trade(&route).await {
        Ok(trade) => {
            info!(
                "🎯 Trade {} {:?}: {} {} @ {}",
                trade.id, trade.status, trade.side, trade.amount, trade.price
            );
            Ok(())
        }
        Err(e @ DexError::VenueTimeout { .. }) => {
            error!("✗ Order submission timed out; check order status on the venue before retrying");
            Err(e.into())
        }
        Err(e) => {
            error!("✗ Execution failed: {} [{}]", e, e.code());
            Err(e.into())
        }
    }
}
