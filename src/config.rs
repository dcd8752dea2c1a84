//! Configuration module for the sniper
//!
//! Configuration is read from a TOML file, then `.env` and the process
//! environment override individual options using the historical variable
//! names (`QUOTE_MINT`, `TAKE_PROFIT1`, ...). Validation runs last; any error
//! is fatal at startup.

use crate::errors::ConfigError;
use crate::types::QuoteToken;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoints configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Wallet configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Entry sizing and admission policy
    #[serde(default)]
    pub trading: TradingConfig,

    /// Eligibility filter toggles
    #[serde(default)]
    pub filters: FilterConfig,

    /// Take-profit / stop-loss monitor
    #[serde(default)]
    pub exit: ExitConfig,

    /// Transaction submission
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// DexScreener lookups
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// HTTP RPC endpoint
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,

    /// Websocket endpoint used for subscriptions
    #[serde(default = "default_ws_endpoint")]
    pub websocket_endpoint: String,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to keypair file (JSON byte array)
    #[serde(default)]
    pub keypair_path: Option<String>,

    /// Base58 secret key, normally supplied through PRIVATE_KEY
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Quote currency symbol: WSOL or USDC
    #[serde(default = "default_quote_mint")]
    pub quote_mint: String,

    /// Amount of quote spent per buy (UI units)
    #[serde(default = "default_quote_amount")]
    pub quote_amount: f64,

    /// Minimum quote-vault balance (UI units, 0 disables)
    #[serde(default)]
    pub min_pool_size: f64,

    /// Maximum quote-vault balance (UI units, 0 disables)
    #[serde(default)]
    pub max_pool_size: f64,

    /// Refuse new entries while a trade is open
    #[serde(default = "default_true")]
    pub one_token_at_a_time: bool,

    /// Only buy mints listed in the snipe list
    #[serde(default)]
    pub use_snipe_list: bool,

    #[serde(default = "default_snipe_list_path")]
    pub snipe_list_path: String,

    /// Snipe list reload interval in milliseconds
    #[serde(default = "default_snipe_list_refresh")]
    pub snipe_list_refresh_interval_ms: u64,

    /// Return the gate to idle when a buy fails instead of faulting it
    #[serde(default)]
    pub release_gate_on_buy_failure: bool,

    /// Attempts a final sell gets to drain the position
    #[serde(default = "default_max_sell_attempts")]
    pub max_sell_attempts: u32,

    /// How long to wait for the wallet notification after a buy
    #[serde(default = "default_fill_timeout")]
    pub fill_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub check_renounced: bool,

    #[serde(default)]
    pub check_social: bool,

    #[serde(default)]
    pub check_mutable: bool,

    #[serde(default)]
    pub check_burned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Tier-1 take profit (%), triggers the partial exit
    #[serde(default = "default_take_profit1")]
    pub take_profit1_percent: f64,

    /// Tier-2 take profit (%), triggers the full exit
    #[serde(default = "default_take_profit2")]
    pub take_profit2_percent: f64,

    /// Stop loss (% below entry)
    #[serde(default = "default_stop_loss")]
    pub stop_loss_percent: f64,

    /// Fraction of holdings sold at tier 1
    #[serde(default = "default_sell_fraction")]
    pub sell_fraction: f64,

    /// Distance below tier 1 that closes the remainder after a partial exit
    #[serde(default = "default_retrace_buffer")]
    pub retrace_buffer_percent: f64,

    #[serde(default = "default_price_check_interval")]
    pub price_check_interval_ms: u64,

    #[serde(default = "default_price_check_duration")]
    pub price_check_duration_ms: u64,

    /// Slippage tolerance (%)
    #[serde(default = "default_slippage")]
    pub slippage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Submit through the block engine as a bundle
    #[serde(default)]
    pub jito_mode: bool,

    #[serde(default = "default_block_engine_url")]
    pub block_engine_url: String,

    /// Tip in lamports appended to bundled transactions
    #[serde(default = "default_jito_tip")]
    pub jito_tip_lamports: u64,

    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,

    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price_micro_lamports: u64,

    /// Bundle confirmation timeout in seconds
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_dexscreener_url")]
    pub dexscreener_base_url: String,

    /// Client-side rate limit
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default)]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Statistics log interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

// Default value functions
fn default_rpc_endpoint() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_ws_endpoint() -> String { "wss://api.mainnet-beta.solana.com".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_quote_mint() -> String { "WSOL".to_string() }
fn default_quote_amount() -> f64 { 0.01 }
fn default_snipe_list_path() -> String { "snipe-list.txt".to_string() }
fn default_snipe_list_refresh() -> u64 { 30_000 }
fn default_max_sell_attempts() -> u32 { 2 }
fn default_fill_timeout() -> u64 { 60 }
fn default_take_profit1() -> f64 { 20.0 }
fn default_take_profit2() -> f64 { 50.0 }
fn default_stop_loss() -> f64 { 30.0 }
fn default_sell_fraction() -> f64 { 0.5 }
fn default_retrace_buffer() -> f64 { 5.0 }
fn default_price_check_interval() -> u64 { 2_000 }
fn default_price_check_duration() -> u64 { 600_000 }
fn default_slippage() -> f64 { 10.0 }
fn default_block_engine_url() -> String { "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string() }
fn default_jito_tip() -> u64 { 100_000 }
fn default_compute_unit_limit() -> u32 { 101_337 }
fn default_compute_unit_price() -> u64 { 421_197 }
fn default_confirm_timeout() -> u64 { 30 }
fn default_dexscreener_url() -> String { "https://api.dexscreener.com".to_string() }
fn default_requests_per_minute() -> u32 { 60 }
fn default_http_timeout() -> u64 { 10 }
fn default_metrics_port() -> u16 { 9090 }
fn default_stats_interval() -> u64 { 60 }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            websocket_endpoint: default_ws_endpoint(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_mint: default_quote_mint(),
            quote_amount: default_quote_amount(),
            min_pool_size: 0.0,
            max_pool_size: 0.0,
            one_token_at_a_time: true,
            use_snipe_list: false,
            snipe_list_path: default_snipe_list_path(),
            snipe_list_refresh_interval_ms: default_snipe_list_refresh(),
            release_gate_on_buy_failure: false,
            max_sell_attempts: default_max_sell_attempts(),
            fill_timeout_secs: default_fill_timeout(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            check_renounced: true,
            check_social: false,
            check_mutable: false,
            check_burned: false,
        }
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit1_percent: default_take_profit1(),
            take_profit2_percent: default_take_profit2(),
            stop_loss_percent: default_stop_loss(),
            sell_fraction: default_sell_fraction(),
            retrace_buffer_percent: default_retrace_buffer(),
            price_check_interval_ms: default_price_check_interval(),
            price_check_duration_ms: default_price_check_duration(),
            slippage_percent: default_slippage(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            jito_mode: false,
            block_engine_url: default_block_engine_url(),
            jito_tip_lamports: default_jito_tip(),
            compute_unit_limit: default_compute_unit_limit(),
            compute_unit_price_micro_lamports: default_compute_unit_price(),
            confirm_timeout_secs: default_confirm_timeout(),
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            dexscreener_base_url: default_dexscreener_url(),
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: default_metrics_port(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            wallet: WalletConfig::default(),
            trading: TradingConfig::default(),
            filters: FilterConfig::default(),
            exit: ExitConfig::default(),
            execution: ExecutionConfig::default(),
            market_data: MarketDataConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

/// Immutable threshold snapshot handed to the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub quote: QuoteToken,
    /// Quote spent per buy (raw units)
    pub quote_amount: u64,
    /// Raw units, 0 disables the bound
    pub min_pool_size: u64,
    /// Raw units, 0 disables the bound
    pub max_pool_size: u64,
    pub take_profit1: f64,
    pub take_profit2: f64,
    pub stop_loss: f64,
    pub retrace_buffer: f64,
    pub sell_fraction: f64,
    pub price_check_interval: Duration,
    pub price_check_duration: Duration,
    pub slippage_percent: f64,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Load {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load configuration with environment variable overrides, then validate
    pub fn from_file_with_env(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = &lookup;
        override_string(lookup, "RPC_ENDPOINT", &mut self.rpc.endpoint);
        override_string(lookup, "RPC_WEBSOCKET_ENDPOINT", &mut self.rpc.websocket_endpoint);
        override_string(lookup, "COMMITMENT_LEVEL", &mut self.rpc.commitment);
        if let Some(key) = lookup("PRIVATE_KEY").filter(|v| !v.trim().is_empty()) {
            self.wallet.private_key = Some(key.trim().to_string());
        }

        override_string(lookup, "QUOTE_MINT", &mut self.trading.quote_mint);
        override_parsed(lookup, "QUOTE_AMOUNT", &mut self.trading.quote_amount)?;
        override_parsed(lookup, "MIN_POOL_SIZE", &mut self.trading.min_pool_size)?;
        override_parsed(lookup, "MAX_POOL_SIZE", &mut self.trading.max_pool_size)?;
        override_parsed(lookup, "USE_SNIPE_LIST", &mut self.trading.use_snipe_list)?;
        override_string(lookup, "SNIPE_LIST_PATH", &mut self.trading.snipe_list_path);
        override_parsed(lookup, "ONE_TOKEN_AT_A_TIME", &mut self.trading.one_token_at_a_time)?;

        override_parsed(lookup, "CHECK_IF_MINT_IS_RENOUNCED", &mut self.filters.check_renounced)?;
        override_parsed(lookup, "CHECK_SOCIAL", &mut self.filters.check_social)?;
        override_parsed(lookup, "CHECK_IF_MUTABLE", &mut self.filters.check_mutable)?;
        override_parsed(lookup, "CHECK_IF_BURNED", &mut self.filters.check_burned)?;

        override_parsed(lookup, "TAKE_PROFIT1", &mut self.exit.take_profit1_percent)?;
        override_parsed(lookup, "TAKE_PROFIT2", &mut self.exit.take_profit2_percent)?;
        override_parsed(lookup, "STOP_LOSS", &mut self.exit.stop_loss_percent)?;
        override_parsed(lookup, "SELL_FRACTION", &mut self.exit.sell_fraction)?;
        override_parsed(lookup, "PRICE_CHECK_INTERVAL", &mut self.exit.price_check_interval_ms)?;
        override_parsed(lookup, "PRICE_CHECK_DURATION", &mut self.exit.price_check_duration_ms)?;
        override_parsed(lookup, "SLIPPAGE", &mut self.exit.slippage_percent)?;

        override_parsed(lookup, "JITO_MODE", &mut self.execution.jito_mode)?;
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.quote_token()?;
        self.commitment()?;

        let trading = &self.trading;
        if !(trading.quote_amount > 0.0) {
            return Err(ConfigError::invalid("trading.quote_amount", "must be positive"));
        }
        if trading.min_pool_size < 0.0 || trading.max_pool_size < 0.0 {
            return Err(ConfigError::invalid("trading.min_pool_size", "pool size bounds must not be negative"));
        }
        if trading.min_pool_size > 0.0
            && trading.max_pool_size > 0.0
            && trading.min_pool_size > trading.max_pool_size
        {
            return Err(ConfigError::invalid(
                "trading.max_pool_size",
                format!("{} is below min_pool_size {}", trading.max_pool_size, trading.min_pool_size),
            ));
        }
        if trading.max_sell_attempts == 0 {
            return Err(ConfigError::invalid("trading.max_sell_attempts", "must be at least 1"));
        }

        let exit = &self.exit;
        if !(exit.take_profit1_percent > 0.0) {
            return Err(ConfigError::invalid("exit.take_profit1_percent", "must be positive"));
        }
        if exit.take_profit2_percent <= exit.take_profit1_percent {
            return Err(ConfigError::invalid(
                "exit.take_profit2_percent",
                "must be greater than take_profit1_percent",
            ));
        }
        if !(exit.stop_loss_percent > 0.0 && exit.stop_loss_percent < 100.0) {
            return Err(ConfigError::invalid("exit.stop_loss_percent", "must be in (0, 100)"));
        }
        if !(exit.sell_fraction > 0.0 && exit.sell_fraction <= 1.0) {
            return Err(ConfigError::invalid("exit.sell_fraction", "must be in (0, 1]"));
        }
        if exit.retrace_buffer_percent < 0.0 || exit.retrace_buffer_percent > exit.take_profit1_percent {
            return Err(ConfigError::invalid(
                "exit.retrace_buffer_percent",
                "must be between 0 and take_profit1_percent",
            ));
        }
        if exit.price_check_interval_ms == 0 {
            return Err(ConfigError::invalid("exit.price_check_interval_ms", "must be positive"));
        }
        if exit.price_check_duration_ms < exit.price_check_interval_ms {
            return Err(ConfigError::invalid(
                "exit.price_check_duration_ms",
                "must be at least one price check interval",
            ));
        }
        if !(exit.slippage_percent >= 0.0 && exit.slippage_percent < 100.0) {
            return Err(ConfigError::invalid("exit.slippage_percent", "must be in [0, 100)"));
        }
        Ok(())
    }

    pub fn quote_token(&self) -> Result<QuoteToken, ConfigError> {
        QuoteToken::from_symbol(&self.trading.quote_mint)
            .ok_or_else(|| ConfigError::UnsupportedQuoteMint(self.trading.quote_mint.clone()))
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        match self.rpc.commitment.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(ConfigError::UnknownCommitment(other.to_string())),
        }
    }

    /// Snapshot of the numeric thresholds in raw quote units
    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        let quote = self.quote_token()?;
        Ok(Thresholds {
            quote,
            quote_amount: quote.to_raw(self.trading.quote_amount),
            min_pool_size: quote.to_raw(self.trading.min_pool_size),
            max_pool_size: quote.to_raw(self.trading.max_pool_size),
            take_profit1: self.exit.take_profit1_percent,
            take_profit2: self.exit.take_profit2_percent,
            stop_loss: self.exit.stop_loss_percent,
            retrace_buffer: self.exit.retrace_buffer_percent,
            sell_fraction: self.exit.sell_fraction,
            price_check_interval: Duration::from_millis(self.exit.price_check_interval_ms),
            price_check_duration: Duration::from_millis(self.exit.price_check_duration_ms),
            slippage_percent: self.exit.slippage_percent,
        })
    }
}

fn override_string<F>(lookup: &F, name: &'static str, target: &mut String)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
        *target = value.trim().to_string();
    }
}

fn override_parsed<F, T>(lookup: &F, name: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => return Err(ConfigError::InvalidEnv { name, value }),
        }
    }
    Ok(())
}
