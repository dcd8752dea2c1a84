//! Run coordinator
//!
//! The [`Engine`] owns every piece of shared state (ledgers, registry, gate,
//! the active trade slot) and is the only component that connects them.
//! Stream notifications are handled concurrently, one task per event:
//!
//! ```text
//! Pool notification
//!   -> decode -> recency check -> pool ledger -> entry policy -> filter chain
//!   -> gate.try_enter -> arm trade slot -> buy
//!   -> lifecycle task: wait for fill -> price monitor -> gate exit / fault
//! Market notification  -> market ledger -> registry.save_market
//! Wallet notification  -> fill of the armed trade, or parked per mint
//! ```
//!
//! The trade slot is armed before the buy is submitted so a wallet
//! notification racing the buy confirmation finds it. Notifications for a
//! mint with no armed trade are parked and picked up when that mint's buy
//! completes.

use crate::broadcast::Broadcaster;
use crate::buy_executor::{BuyExecutor, BuyReceipt};
use crate::chain::ChainReader;
use crate::config::{Config, Thresholds};
use crate::control::ControlCommand;
use crate::dedup::DedupLedger;
use crate::errors::{ConfigError, ExecutionError, LookupError};
use crate::filters::{ChainVerdict, FilterChain, RejectReason};
use crate::gate::{EntryPolicy, GateState, PositionGate};
use crate::layouts::{MinimalMarketV3, TokenAccountInfo};
use crate::metrics::metrics;
use crate::monitor::{ExitReason, MonitorOutcome, PriceMonitor};
use crate::oracles::MarketDataProvider;
use crate::registry::TokenAccountRegistry;
use crate::sell_executor::SellExecutor;
use crate::stream::StreamEvent;
use crate::structured_logging::PipelineContext;
use crate::swap::{QuoteSource, SwapBuilder};
use crate::types::{unix_timestamp, PoolCandidate, TradeState};
use dashmap::DashMap;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Run-wide settings fixed at startup
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Wallet public key
    pub owner: Pubkey,
    pub thresholds: Thresholds,
    /// Pools opening at or before this Unix time are ignored
    pub run_timestamp: u64,
    pub release_gate_on_buy_failure: bool,
    pub max_sell_attempts: u32,
    /// Wait for the wallet notification before falling back to a balance read
    pub fill_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config, owner: Pubkey) -> Result<Self, ConfigError> {
        Ok(Self {
            owner,
            thresholds: config.thresholds()?,
            run_timestamp: unix_timestamp(),
            release_gate_on_buy_failure: config.trading.release_gate_on_buy_failure,
            max_sell_attempts: config.trading.max_sell_attempts,
            fill_timeout: Duration::from_secs(config.trading.fill_timeout_secs),
        })
    }
}

/// Everything the engine is built from
pub struct SniperContext {
    pub settings: EngineSettings,
    pub reader: Arc<dyn ChainReader>,
    pub registry: Arc<TokenAccountRegistry>,
    pub gate: Arc<PositionGate>,
    pub policy: Arc<EntryPolicy>,
    pub filters: FilterChain,
    pub swap_builder: Arc<dyn SwapBuilder>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub quotes: Arc<dyn QuoteSource>,
    pub market_data: Option<Arc<dyn MarketDataProvider>>,
}

/// What happened to a pool notification
#[derive(Debug)]
pub enum PoolOutcome {
    Malformed,
    /// Opened before this run started
    Stale,
    Duplicate,
    /// Entry policy refused the mint (snipe list, or a trade is open)
    NotAllowed,
    Rejected {
        filter: &'static str,
        reason: RejectReason,
    },
    GateBusy,
    BuyFailed(ExecutionError),
    Entered {
        mint: Pubkey,
        lifecycle: JoinHandle<LifecycleOutcome>,
    },
}

/// How a trade lifecycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    Closed(ExitReason),
    /// Final sell left tokens behind; the gate is faulted
    Incomplete(ExitReason),
    /// The buy landed but no tokens ever showed up; the gate is faulted
    NoFill,
}

/// What happened to a wallet token-account notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOutcome {
    Ignored,
    Filled,
    Parked,
}

struct ActiveTrade {
    mint: Pubkey,
    fill: Option<oneshot::Sender<u64>>,
    sell_now: watch::Sender<bool>,
}

pub struct Engine {
    settings: EngineSettings,
    reader: Arc<dyn ChainReader>,
    registry: Arc<TokenAccountRegistry>,
    gate: Arc<PositionGate>,
    policy: Arc<EntryPolicy>,
    filters: FilterChain,
    market_data: Option<Arc<dyn MarketDataProvider>>,
    pools: DedupLedger,
    markets: DedupLedger,
    buyer: BuyExecutor,
    monitor: PriceMonitor,
    active: Mutex<Option<ActiveTrade>>,
    parked: DashMap<Pubkey, u64>,
}

impl Engine {
    pub fn new(ctx: SniperContext) -> Arc<Self> {
        let settings = ctx.settings;
        let buyer = BuyExecutor::new(
            ctx.reader.clone(),
            ctx.registry.clone(),
            ctx.swap_builder.clone(),
            ctx.broadcaster.clone(),
            settings.owner,
            settings.thresholds.quote_amount,
        );
        let seller = Arc::new(SellExecutor::new(
            ctx.reader.clone(),
            ctx.quotes.clone(),
            ctx.swap_builder,
            ctx.broadcaster,
            settings.max_sell_attempts,
        ));
        let monitor = PriceMonitor::new(
            ctx.reader.clone(),
            ctx.quotes,
            seller,
            &settings.thresholds,
        );

        Arc::new(Self {
            settings,
            reader: ctx.reader,
            registry: ctx.registry,
            gate: ctx.gate,
            policy: ctx.policy,
            filters: ctx.filters,
            market_data: ctx.market_data,
            pools: DedupLedger::new("pools"),
            markets: DedupLedger::new("markets"),
            buyer,
            monitor,
            active: Mutex::new(None),
            parked: DashMap::new(),
        })
    }

    pub fn gate(&self) -> &PositionGate {
        &self.gate
    }

    pub fn registry(&self) -> &TokenAccountRegistry {
        &self.registry
    }

    pub fn pools_seen(&self) -> usize {
        self.pools.len()
    }

    pub fn markets_seen(&self) -> usize {
        self.markets.len()
    }

    /// Mint of the armed trade, if any
    pub fn active_mint(&self) -> Option<Pubkey> {
        self.active.lock().as_ref().map(|t| t.mint)
    }

    pub fn parked_balance(&self, mint: &Pubkey) -> Option<u64> {
        self.parked.get(mint).map(|v| *v)
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Consume stream events and control commands until the stream closes
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<StreamEvent>,
        mut control: mpsc::Receiver<ControlCommand>,
    ) {
        let mut control_open = true;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let engine = self.clone();
                        tokio::spawn(async move { engine.handle_event(event).await });
                    }
                    None => {
                        warn!("Event stream closed, engine stopping");
                        break;
                    }
                },
                command = control.recv(), if control_open => match command {
                    Some(command) => self.handle_control(command),
                    None => control_open = false,
                },
            }
        }
    }

    pub async fn handle_event(self: &Arc<Self>, event: StreamEvent) {
        match event {
            StreamEvent::Pool { id, data } => {
                let outcome = self.handle_pool(id, &data).await;
                debug!(pool = %id, outcome = ?outcome, "Pool notification handled");
            }
            StreamEvent::Market { id, data } => {
                self.handle_market(id, &data);
            }
            StreamEvent::WalletAccount { address, data } => {
                self.handle_wallet(address, &data);
            }
            StreamEvent::WalletTransaction { signature, failed } => {
                self.handle_wallet_transaction(&signature, failed);
            }
        }
    }

    // =========================================================================
    // Pools
    // =========================================================================

    pub async fn handle_pool(self: &Arc<Self>, id: Pubkey, data: &[u8]) -> PoolOutcome {
        let candidate = match PoolCandidate::decode(id, data) {
            Ok(candidate) => candidate,
            Err(e) => {
                metrics().decode_failures.inc();
                warn!(pool = %id, error = %e, "Malformed pool notification dropped");
                return PoolOutcome::Malformed;
            }
        };

        if candidate.open_time <= self.settings.run_timestamp {
            return PoolOutcome::Stale;
        }
        if !self.pools.admit(id) {
            metrics()
                .duplicates_suppressed
                .with_label_values(&[self.pools.scope()])
                .inc();
            debug!(pool = %id, "Duplicate pool notification suppressed");
            return PoolOutcome::Duplicate;
        }
        metrics().pools_detected.inc();

        let ctx = PipelineContext::new("pool");
        ctx.logger
            .log_pool_detected(&id, &candidate.base_mint, &candidate.dexscreener_url());

        if !self.policy.should_buy(&candidate.base_mint, &self.gate) {
            debug!(mint = %candidate.base_mint, "Entry policy refused candidate");
            return PoolOutcome::NotAllowed;
        }

        if let ChainVerdict::Reject { filter, reason } = self.filters.evaluate(&candidate).await {
            metrics()
                .candidates_rejected
                .with_label_values(&[filter])
                .inc();
            ctx.logger
                .log_filter_rejected(&candidate.base_mint, filter, &reason.to_string());
            return PoolOutcome::Rejected { filter, reason };
        }

        if !self.gate.try_enter() {
            info!(mint = %candidate.base_mint, gate = ?self.gate.state(), "Gate busy, skipping candidate");
            return PoolOutcome::GateBusy;
        }
        self.publish_gate();

        let (fill_tx, fill_rx) = oneshot::channel();
        let (sell_tx, sell_rx) = watch::channel(false);
        *self.active.lock() = Some(ActiveTrade {
            mint: candidate.base_mint,
            fill: Some(fill_tx),
            sell_now: sell_tx,
        });

        match self.buyer.buy(&candidate, &ctx).await {
            Ok(receipt) => {
                let mint = receipt.mint;
                let engine = self.clone();
                let lifecycle = tokio::spawn(async move {
                    engine.run_lifecycle(receipt, fill_rx, sell_rx, ctx).await
                });
                PoolOutcome::Entered { mint, lifecycle }
            }
            Err(e) => {
                *self.active.lock() = None;
                self.on_buy_failure(&candidate.base_mint, &e);
                PoolOutcome::BuyFailed(e)
            }
        }
    }

    fn on_buy_failure(&self, mint: &Pubkey, err: &ExecutionError) {
        if self.settings.release_gate_on_buy_failure {
            self.gate.exit();
            warn!(mint = %mint, error = %err, "Buy failed, gate released");
        } else {
            self.gate.fault();
            error!(
                mint = %mint,
                error = %err,
                "🚨 Buy failed, position gate FAULTED. No new trades until `reset`"
            );
        }
        self.publish_gate();
    }

    async fn run_lifecycle(
        self: Arc<Self>,
        receipt: BuyReceipt,
        fill_rx: oneshot::Receiver<u64>,
        sell_rx: watch::Receiver<bool>,
        ctx: PipelineContext,
    ) -> LifecycleOutcome {
        let ctx = ctx.child("lifecycle");
        let mint = receipt.mint;

        let Some(tokens) = self.await_fill(&receipt, fill_rx).await else {
            ctx.logger
                .error(&format!("Buy {} landed but no tokens arrived", receipt.signature));
            self.finish(&mint, false);
            return LifecycleOutcome::NoFill;
        };
        info!(mint = %mint, tokens, correlation_id = %ctx.correlation_id, "📥 Fill confirmed");

        if let Some(provider) = self.market_data.clone() {
            let pool = receipt.pool_keys.id;
            tokio::spawn(async move { log_pair_stats(provider, pool).await });
        }

        let mut trade = TradeState::new(
            mint,
            receipt.pool_keys,
            receipt.token_account,
            receipt.entry_amount,
            tokens,
        );

        match self.monitor.run(&mut trade, sell_rx, &ctx).await {
            MonitorOutcome::Closed(reason) => {
                self.finish(&mint, true);
                LifecycleOutcome::Closed(reason)
            }
            MonitorOutcome::Incomplete { reason, error } => {
                error!(
                    mint = %mint,
                    error = %error,
                    "🚨 Position not fully closed, position gate FAULTED. Sell manually, then `reset`"
                );
                self.finish(&mint, false);
                LifecycleOutcome::Incomplete(reason)
            }
        }
    }

    /// Tokens received by the buy: parked notification, live notification, or a balance read
    async fn await_fill(&self, receipt: &BuyReceipt, fill_rx: oneshot::Receiver<u64>) -> Option<u64> {
        if let Some((_, amount)) = self.parked.remove(&receipt.mint) {
            debug!(mint = %receipt.mint, amount, "Using parked wallet notification");
            return Some(amount);
        }
        match tokio::time::timeout(self.settings.fill_timeout, fill_rx).await {
            Ok(Ok(amount)) => Some(amount),
            _ => {
                warn!(mint = %receipt.mint, "No wallet notification, reading balance");
                match self.reader.token_balance(&receipt.token_account).await {
                    Ok(amount) if amount > 0 => Some(amount),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(mint = %receipt.mint, error = %e, "Balance read failed");
                        None
                    }
                }
            }
        }
    }

    fn finish(&self, mint: &Pubkey, closed: bool) {
        *self.active.lock() = None;
        self.parked.remove(mint);
        if closed {
            self.gate.exit();
        } else {
            self.gate.fault();
        }
        self.publish_gate();
    }

    fn publish_gate(&self) {
        metrics().gate_state.set(self.gate.state().as_gauge());
    }

    // =========================================================================
    // Markets and wallet
    // =========================================================================

    /// Cache a newly seen market; false for duplicates and undecodable data
    pub fn handle_market(&self, id: Pubkey, data: &[u8]) -> bool {
        if !self.markets.admit(id) {
            metrics()
                .duplicates_suppressed
                .with_label_values(&[self.markets.scope()])
                .inc();
            return false;
        }
        let decoded = MinimalMarketV3::decode(data).and_then(|market| {
            MinimalMarketV3::decode_base_mint(data).map(|base_mint| (market, base_mint))
        });
        let (market, base_mint) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics().decode_failures.inc();
                warn!(market = %id, error = %e, "Malformed market notification dropped");
                return false;
            }
        };

        let address = get_associated_token_address(&self.settings.owner, &base_mint);
        self.registry.save_market(base_mint, address, market);
        metrics().registry_size.set(self.registry.len() as i64);
        debug!(market = %id, mint = %base_mint, "Market cached");
        true
    }

    pub fn handle_wallet(&self, address: Pubkey, data: &[u8]) -> WalletOutcome {
        let info = match TokenAccountInfo::decode(data) {
            Ok(info) => info,
            Err(e) => {
                metrics().decode_failures.inc();
                warn!(account = %address, error = %e, "Malformed wallet notification dropped");
                return WalletOutcome::Ignored;
            }
        };
        if info.owner != self.settings.owner || info.mint == self.settings.thresholds.quote.mint {
            return WalletOutcome::Ignored;
        }
        if self.registry.insert_account(info.mint, address) {
            metrics().registry_size.set(self.registry.len() as i64);
        }
        if info.amount == 0 {
            return WalletOutcome::Ignored;
        }

        let mut active = self.active.lock();
        if let Some(trade) = active.as_mut().filter(|t| t.mint == info.mint) {
            return match trade.fill.take() {
                Some(fill) => {
                    if fill.send(info.amount).is_err() {
                        debug!(mint = %info.mint, "Fill receiver already gone");
                    }
                    WalletOutcome::Filled
                }
                None => WalletOutcome::Ignored,
            };
        }
        drop(active);

        self.parked.insert(info.mint, info.amount);
        debug!(mint = %info.mint, amount = info.amount, "Wallet notification parked");
        WalletOutcome::Parked
    }

    pub fn handle_wallet_transaction(&self, signature: &str, failed: bool) {
        if failed {
            warn!(signature, "Wallet transaction failed: https://solscan.io/tx/{}", signature);
        } else {
            info!(signature, "Wallet transaction landed: https://solscan.io/tx/{}", signature);
        }
    }

    // =========================================================================
    // Startup and control
    // =========================================================================

    /// Register the wallet's existing token accounts; returns how many were found
    pub async fn load_inventory(&self) -> Result<usize, LookupError> {
        let owner = self.settings.owner;
        let accounts = self.reader.wallet_token_accounts(&owner).await?;
        for (address, info) in &accounts {
            self.registry.insert_account(info.mint, *address);
        }
        metrics().registry_size.set(self.registry.len() as i64);

        let quote = self.settings.thresholds.quote;
        let quote_account = get_associated_token_address(&owner, &quote.mint);
        let (lamports, quote_balance) = tokio::join!(
            self.reader.lamports(&owner),
            self.reader.token_balance(&quote_account)
        );
        info!(
            wallet = %owner,
            token_accounts = accounts.len(),
            sol = lamports.map(|l| l as f64 / 1e9).unwrap_or_default(),
            quote = quote.symbol,
            quote_balance = quote_balance.map(|b| quote.to_ui(b)).unwrap_or_default(),
            "💼 Wallet inventory loaded"
        );
        Ok(accounts.len())
    }

    pub fn handle_control(&self, command: ControlCommand) {
        match command {
            ControlCommand::SellNow => match self.active.lock().as_ref() {
                Some(trade) => {
                    if trade.sell_now.send(true).is_err() {
                        warn!(mint = %trade.mint, "Monitor not running yet, sell-now ignored");
                    } else {
                        info!(mint = %trade.mint, "Sell-now requested");
                    }
                }
                None => warn!("Sell-now requested but no trade is active"),
            },
            ControlCommand::ResetGate => {
                if self.gate.reset() {
                    info!("Position gate reset to idle");
                } else {
                    warn!(gate = ?self.gate.state(), "Gate is not faulted, nothing to reset");
                }
                self.publish_gate();
            }
            ControlCommand::Status => self.log_status(),
        }
    }

    pub fn log_status(&self) {
        let gate = self.gate.state();
        info!(
            gate = ?gate,
            active = ?self.active_mint(),
            pools_seen = self.pools.len(),
            markets_seen = self.markets.len(),
            token_accounts = self.registry.len(),
            "📊 Status"
        );
        if gate == GateState::Faulted {
            warn!("Position gate is FAULTED; send `reset` once the wallet is clean");
        }
    }
}

async fn log_pair_stats(provider: Arc<dyn MarketDataProvider>, pool: Pubkey) {
    match provider.pair_stats(&pool).await {
        Ok(Some(stats)) => info!(
            pool = %pool,
            price_usd = ?stats.price_usd,
            liquidity_usd = ?stats.liquidity_usd,
            volume_h24 = ?stats.volume_h24,
            change_h1 = ?stats.price_change_h1,
            change_h24 = ?stats.price_change_h24,
            "Pair stats"
        ),
        Ok(None) => debug!(pool = %pool, "No pair stats yet"),
        Err(e) => debug!(pool = %pool, error = %e, "Pair stats lookup failed"),
    }
}
