//! Raydium AMM v4 new-pool sniper
//!
//! Watches Raydium for pools created after startup, runs them through the
//! eligibility filters, buys one at a time and manages the exit with tiered
//! take profit, stop loss and a time box.
//!
//! ## Operator commands (stdin)
//!
//! - `sell`: exit the open position at the next tick
//! - `reset`: clear a faulted position gate
//! - `status`: log a status summary

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use sniper::broadcast::{Broadcaster, JitoBroadcaster, RpcBroadcaster};
use sniper::chain::{ChainReader, RpcChainReader};
use sniper::config::{Config, TradingConfig};
use sniper::control;
use sniper::endpoints::endpoint_server;
use sniper::engine::{Engine, EngineSettings, SniperContext};
use sniper::filters::FilterChain;
use sniper::gate::{EntryPolicy, PositionGate, SnipeList};
use sniper::oracles::{
    DexScreenerClient, MarketDataProvider, RpcSafetyOracle, SocialLookup, TokenSafetyOracle,
};
use sniper::registry::TokenAccountRegistry;
use sniper::stream::WebSocketStream;
use sniper::swap::{QuoteSource, RaydiumSwapBuilder, ReserveQuoteSource, SwapBuilder};
use sniper::wallet::WalletManager;
use solana_client::nonblocking::rpc_client::RpcClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;

    info!("🚀 Starting Raydium sniper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    info!("📋 Loading configuration from: {}", args.config);
    let config = load_config(&args.config)?;
    let thresholds = config.thresholds()?;
    let commitment = config.commitment()?;

    // Initialize wallet
    let wallet = WalletManager::from_config(&config.wallet).context("Failed to load wallet")?;
    info!("🔑 Wallet: {}", wallet.pubkey());

    let rpc = Arc::new(RpcClient::new_with_timeout_and_commitment(
        config.rpc.endpoint.clone(),
        Duration::from_secs(config.rpc.timeout_secs),
        commitment,
    ));
    let reader: Arc<dyn ChainReader> = Arc::new(RpcChainReader::new(rpc.clone(), commitment));

    // Filters
    let oracle: Arc<dyn TokenSafetyOracle> = Arc::new(RpcSafetyOracle::new(reader.clone()));
    let dexscreener = Arc::new(
        DexScreenerClient::new(&config.market_data).context("Failed to build DexScreener client")?,
    );
    let social: Arc<dyn SocialLookup> = dexscreener.clone();
    let market_data: Arc<dyn MarketDataProvider> = dexscreener;
    let filters = FilterChain::from_config(
        &config.filters,
        &thresholds,
        reader.clone(),
        oracle,
        social,
    );
    info!("🧪 Filters: {:?}", filters.names());

    let policy = Arc::new(build_policy(&config.trading).await);

    // Execution
    let swap_builder: Arc<dyn SwapBuilder> =
        Arc::new(RaydiumSwapBuilder::new(wallet.pubkey(), thresholds.quote));
    let broadcaster: Arc<dyn Broadcaster> = if config.execution.jito_mode {
        info!("⚡ Priority submission through {}", config.execution.block_engine_url);
        Arc::new(JitoBroadcaster::new(
            rpc.clone(),
            wallet.keypair_arc(),
            &config.execution,
        )?)
    } else {
        Arc::new(RpcBroadcaster::new(
            rpc.clone(),
            wallet.keypair_arc(),
            &config.execution,
        ))
    };
    let quotes: Arc<dyn QuoteSource> = Arc::new(ReserveQuoteSource::new(
        reader.clone(),
        thresholds.slippage_percent,
    ));

    let engine = Engine::new(SniperContext {
        settings: EngineSettings::from_config(&config, wallet.pubkey())?,
        reader,
        registry: Arc::new(TokenAccountRegistry::new()),
        gate: Arc::new(PositionGate::new()),
        policy: policy.clone(),
        filters,
        swap_builder,
        broadcaster,
        quotes,
        market_data: Some(market_data),
    });

    engine
        .load_inventory()
        .await
        .context("Failed to load wallet token accounts")?;

    if config.monitoring.enable_metrics {
        let port = config.monitoring.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = endpoint_server(port).await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    if policy.snipe_list().is_some() {
        let refresh = Duration::from_millis(config.trading.snipe_list_refresh_interval_ms);
        let policy = policy.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Some(list) = policy.snipe_list() {
                    if let Err(e) = list.reload().await {
                        warn!("Snipe list reload failed: {}", e);
                    }
                }
            }
        });
    }

    // Subscriptions
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let stream = WebSocketStream::new(config.rpc.websocket_endpoint.clone(), commitment);
    let pubsub = stream.connect().await?;
    stream.subscribe_all(
        pubsub,
        &thresholds.quote.mint,
        &wallet.pubkey(),
        &wallet.token_account(&thresholds.quote.mint),
        event_tx,
    );

    let (control_tx, control_rx) = mpsc::channel(16);
    control::spawn_stdin_reader(control_tx);

    let stats_engine = engine.clone();
    let stats_every = Duration::from_secs(config.monitoring.stats_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_every);
        interval.tick().await;
        loop {
            interval.tick().await;
            stats_engine.log_status();
        }
    });

    info!("✅ All components initialized successfully");
    info!(
        "🎬 Listening for new {} pools. Commands: sell | reset | status",
        thresholds.quote.symbol
    );

    tokio::select! {
        _ = engine.run(event_rx, control_rx) => {
            warn!("Event stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal");
        }
    }

    info!("👋 Shutting down gracefully...");
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "sniper=debug,raydium_sniper=debug,info"
    } else {
        "sniper=info,raydium_sniper=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults and environment", path);
        Config::from_env().context("Invalid configuration")
    }
}

async fn build_policy(trading: &TradingConfig) -> EntryPolicy {
    if trading.use_snipe_list {
        let list = SnipeList::from_file(&trading.snipe_list_path);
        match list.reload().await {
            Ok(count) => info!("🎯 Snipe list loaded: {} mints", count),
            Err(e) => warn!("Snipe list {} not readable: {}", trading.snipe_list_path, e),
        }
        EntryPolicy::SnipeList(list)
    } else if trading.one_token_at_a_time {
        EntryPolicy::OneAtATime
    } else {
        EntryPolicy::Unrestricted
    }
}
