//! In-memory collaborators shared by the integration tests
//!
//! `FakeChain` holds raw accounts. `FakeSwapBuilder` emits one marker
//! instruction per swap and `FakeBroadcaster` applies it to the chain, so
//! buys credit and sells debit the wallet token account like a real venue.

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sniper::broadcast::Broadcaster;
use sniper::chain::ChainReader;
use sniper::config::Thresholds;
use sniper::engine::{Engine, EngineSettings, SniperContext};
use sniper::errors::{ExecutionError, LookupError};
use sniper::filters::{FilterChain, FilterVerdict, PoolFilter};
use sniper::gate::{EntryPolicy, PositionGate};
use sniper::layouts::{LiquidityStateV4, MinimalMarketV3, TokenAccountInfo};
use sniper::oracles::{SocialLookup, TokenSafetyOracle};
use sniper::registry::TokenAccountRegistry;
use sniper::swap::{QuoteSource, SwapBuilder, SwapDirection, SwapQuote};
use sniper::types::{PoolCandidate, PoolKeys, QuoteToken, OPENBOOK_PROGRAM_ID, WSOL_MINT};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use spl_associated_token_account::get_associated_token_address;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const RUN_TIMESTAMP: u64 = 1_000;
pub const ENTRY_AMOUNT: u64 = 1_000_000_000;
pub const FILL_TOKENS: u64 = 1_000_000;

// =============================================================================
// Chain
// =============================================================================

#[derive(Default)]
pub struct FakeChain {
    accounts: DashMap<Pubkey, Vec<u8>>,
    pub lamports: AtomicU64,
    pub reads_fail: AtomicBool,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.insert(address, data);
    }

    pub fn remove(&self, address: &Pubkey) {
        self.accounts.remove(address);
    }

    pub fn set_token_account(&self, address: Pubkey, mint: Pubkey, owner: Pubkey, amount: u64) {
        self.set_account(address, TokenAccountInfo { mint, owner, amount }.encode());
    }

    pub fn balance(&self, address: &Pubkey) -> u64 {
        self.accounts
            .get(address)
            .and_then(|data| TokenAccountInfo::decode(&data).ok())
            .map(|info| info.amount)
            .unwrap_or(0)
    }

    pub fn account_snapshot(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.accounts.get(address).map(|d| d.clone())
    }

    pub fn exists(&self, address: &Pubkey) -> bool {
        self.accounts.contains_key(address)
    }

    fn check(&self) -> Result<(), LookupError> {
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(LookupError::Rpc("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LookupError> {
        self.check()?;
        Ok(self.accounts.get(address).map(|d| d.clone()))
    }

    async fn lamports(&self, _address: &Pubkey) -> Result<u64, LookupError> {
        self.check()?;
        Ok(self.lamports.load(Ordering::SeqCst))
    }

    async fn wallet_token_accounts(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<(Pubkey, TokenAccountInfo)>, LookupError> {
        self.check()?;
        Ok(self
            .accounts
            .iter()
            .filter(|entry| entry.value().len() == TokenAccountInfo::SPAN)
            .filter_map(|entry| {
                TokenAccountInfo::decode(entry.value())
                    .ok()
                    .filter(|info| info.owner == *owner)
                    .map(|info| (*entry.key(), info))
            })
            .collect())
    }
}

// =============================================================================
// Swaps
// =============================================================================

const TAG_BUY: u8 = 0;
const TAG_SELL: u8 = 1;
const TAG_SELL_CLOSE: u8 = 2;

pub struct FakeSwapBuilder {
    owner: Pubkey,
    pub calls: Mutex<Vec<(SwapDirection, u64, u64)>>,
}

impl FakeSwapBuilder {
    pub fn new(owner: Pubkey) -> Arc<Self> {
        Arc::new(Self {
            owner,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn sells(&self) -> Vec<(SwapDirection, u64, u64)> {
        self.calls
            .lock()
            .iter()
            .filter(|(d, _, _)| matches!(d, SwapDirection::Sell { .. }))
            .copied()
            .collect()
    }
}

impl SwapBuilder for FakeSwapBuilder {
    fn build_swap(
        &self,
        keys: &PoolKeys,
        direction: SwapDirection,
        amount_in: u64,
        min_amount_out: u64,
    ) -> Result<Vec<Instruction>, ExecutionError> {
        self.calls.lock().push((direction, amount_in, min_amount_out));
        let tag = match direction {
            SwapDirection::Buy => TAG_BUY,
            SwapDirection::Sell { close_account: false } => TAG_SELL,
            SwapDirection::Sell { close_account: true } => TAG_SELL_CLOSE,
        };
        let mut data = vec![tag];
        data.extend_from_slice(&amount_in.to_le_bytes());
        Ok(vec![Instruction {
            program_id: keys.program_id,
            accounts: vec![
                AccountMeta::new(get_associated_token_address(&self.owner, &keys.base_mint), false),
                AccountMeta::new_readonly(keys.base_mint, false),
            ],
            data,
        }])
    }
}

/// Applies marker swaps to a [`FakeChain`]; failures are scripted per submission
pub struct FakeBroadcaster {
    chain: Arc<FakeChain>,
    owner: Pubkey,
    fill_tokens: u64,
    script: Mutex<VecDeque<Result<(), ExecutionError>>>,
    pub submits: AtomicUsize,
}

impl FakeBroadcaster {
    pub fn new(chain: Arc<FakeChain>, owner: Pubkey, fill_tokens: u64) -> Arc<Self> {
        Arc::new(Self {
            chain,
            owner,
            fill_tokens,
            script: Mutex::new(VecDeque::new()),
            submits: AtomicUsize::new(0),
        })
    }

    /// Queue outcomes for the next submissions; unscripted submissions succeed
    pub fn script(&self, outcomes: Vec<Result<(), ExecutionError>>) {
        self.script.lock().extend(outcomes);
    }

    pub fn fail_next(&self, count: usize) {
        self.script((0..count).map(|_| Err(broadcast_error())).collect());
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

pub fn broadcast_error() -> ExecutionError {
    ExecutionError::Broadcast("blockhash not found".to_string())
}

#[async_trait]
impl Broadcaster for FakeBroadcaster {
    async fn submit(&self, instructions: Vec<Instruction>) -> Result<Signature, ExecutionError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.script.lock().pop_front() {
            outcome?;
        }

        let ix = instructions
            .first()
            .ok_or_else(|| ExecutionError::InstructionBuild("empty".to_string()))?;
        let account = ix.accounts[0].pubkey;
        let mint = ix.accounts[1].pubkey;
        let amount = u64::from_le_bytes(ix.data[1..9].try_into().unwrap());
        let balance = self.chain.balance(&account);

        match ix.data[0] {
            TAG_BUY => self
                .chain
                .set_token_account(account, mint, self.owner, balance + self.fill_tokens),
            tag => {
                let left = balance.saturating_sub(amount);
                if tag == TAG_SELL_CLOSE && left == 0 {
                    self.chain.remove(&account);
                } else {
                    self.chain.set_token_account(account, mint, self.owner, left);
                }
            }
        }
        Ok(Signature::new_unique())
    }
}

// =============================================================================
// Quotes
// =============================================================================

/// Values held tokens at `entry_amount / initial_tokens` per token times a scripted multiplier
///
/// `None` in the script is a failed lookup. The last multiplier repeats once
/// the script runs out.
pub struct FakeQuotes {
    entry_amount: u64,
    initial_tokens: u64,
    script: Mutex<VecDeque<Option<f64>>>,
    last: Mutex<f64>,
    pub calls: AtomicUsize,
}

impl FakeQuotes {
    pub fn constant(entry_amount: u64, initial_tokens: u64) -> Arc<Self> {
        Self::scripted(entry_amount, initial_tokens, vec![])
    }

    pub fn scripted(entry_amount: u64, initial_tokens: u64, script: Vec<Option<f64>>) -> Arc<Self> {
        Arc::new(Self {
            entry_amount,
            initial_tokens,
            script: Mutex::new(script.into()),
            last: Mutex::new(1.0),
            calls: AtomicUsize::new(0),
        })
    }

    /// Script from P&L percentages
    pub fn from_pnl(entry_amount: u64, initial_tokens: u64, pnl: &[f64]) -> Arc<Self> {
        Self::scripted(
            entry_amount,
            initial_tokens,
            pnl.iter().map(|p| Some(1.0 + p / 100.0)).collect(),
        )
    }
}

#[async_trait]
impl QuoteSource for FakeQuotes {
    async fn quote_sell(&self, _keys: &PoolKeys, token_amount: u64) -> Result<SwapQuote, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let multiplier = match self.script.lock().pop_front() {
            Some(Some(m)) => {
                *self.last.lock() = m;
                m
            }
            Some(None) => return Err(LookupError::Rpc("timeout".to_string())),
            None => *self.last.lock(),
        };
        let per_token = self.entry_amount as f64 / self.initial_tokens as f64;
        let value = (token_amount as f64 * per_token * multiplier).round() as u64;
        Ok(SwapQuote {
            amount_out: value,
            min_amount_out: value,
        })
    }
}

// =============================================================================
// Oracles and filters
// =============================================================================

pub struct FakeOracle {
    pub renounced: bool,
    pub mutable: Option<bool>,
    pub burned: Option<bool>,
    pub calls: AtomicUsize,
}

impl FakeOracle {
    pub fn safe() -> Self {
        Self {
            renounced: true,
            mutable: Some(false),
            burned: Some(true),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TokenSafetyOracle for FakeOracle {
    async fn mint_authority_renounced(&self, _mint: &Pubkey) -> Result<bool, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.renounced)
    }

    async fn metadata_mutable(&self, _mint: &Pubkey) -> Result<Option<bool>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mutable)
    }

    async fn lp_fully_burned(&self, _lp_mint: &Pubkey) -> Result<Option<bool>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.burned)
    }
}

pub struct FakeSocial(pub Result<bool, LookupError>);

#[async_trait]
impl SocialLookup for FakeSocial {
    async fn has_socials(&self, _mint: &Pubkey) -> Result<bool, LookupError> {
        self.0.clone()
    }
}

pub struct CountingFilter {
    pub name: &'static str,
    pub verdict: FilterVerdict,
    pub calls: Arc<AtomicUsize>,
}

impl CountingFilter {
    pub fn new(name: &'static str, verdict: FilterVerdict) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                verdict,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl PoolFilter for CountingFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn check(&self, _candidate: &PoolCandidate) -> FilterVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict.clone()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn thresholds(interval: Duration, duration: Duration) -> Thresholds {
    Thresholds {
        quote: QuoteToken::wsol(),
        quote_amount: ENTRY_AMOUNT,
        min_pool_size: 0,
        max_pool_size: 0,
        take_profit1: 20.0,
        take_profit2: 50.0,
        stop_loss: 30.0,
        retrace_buffer: 5.0,
        sell_fraction: 0.5,
        price_check_interval: interval,
        price_check_duration: duration,
        slippage_percent: 0.0,
    }
}

pub fn pool_state(open_time: u64) -> LiquidityStateV4 {
    LiquidityStateV4 {
        status: LiquidityStateV4::STATUS_SWAP_ONLY,
        base_decimal: 6,
        quote_decimal: 9,
        pool_open_time: open_time,
        swap_quote_in_amount: 0,
        base_vault: Pubkey::new_unique(),
        quote_vault: Pubkey::new_unique(),
        base_mint: Pubkey::new_unique(),
        quote_mint: WSOL_MINT,
        lp_mint: Pubkey::new_unique(),
        open_orders: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        market_program_id: OPENBOOK_PROGRAM_ID,
        target_orders: Pubkey::new_unique(),
        withdraw_queue: Pubkey::new_unique(),
        lp_vault: Pubkey::new_unique(),
        owner: Pubkey::new_unique(),
        lp_reserve: 0,
    }
}

pub fn sample_market() -> MinimalMarketV3 {
    MinimalMarketV3 {
        event_queue: Pubkey::new_unique(),
        bids: Pubkey::new_unique(),
        asks: Pubkey::new_unique(),
    }
}

pub fn pool_keys(state: &LiquidityStateV4) -> PoolKeys {
    PoolKeys::derive(Pubkey::new_unique(), state, &sample_market()).unwrap()
}

/// A new pool whose market account and quote vault exist on `chain`
pub fn install_pool(chain: &FakeChain, open_time: u64, quote_reserve: u64) -> (Pubkey, LiquidityStateV4) {
    let state = pool_state(open_time);
    let market = sample_market();
    chain.set_account(state.market_id, market.encode(&state.base_mint, &state.quote_mint));
    chain.set_token_account(state.quote_vault, WSOL_MINT, Pubkey::new_unique(), quote_reserve);
    (Pubkey::new_unique(), state)
}

// =============================================================================
// Engine harness
// =============================================================================

pub struct Harness {
    pub engine: Arc<Engine>,
    pub chain: Arc<FakeChain>,
    pub broadcaster: Arc<FakeBroadcaster>,
    pub swaps: Arc<FakeSwapBuilder>,
    pub gate: Arc<PositionGate>,
    pub registry: Arc<TokenAccountRegistry>,
    pub owner: Pubkey,
}

pub struct HarnessBuilder {
    filters: FilterChain,
    policy: EntryPolicy,
    release_gate_on_buy_failure: bool,
    max_sell_attempts: u32,
    chain: Arc<FakeChain>,
    owner: Pubkey,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            filters: FilterChain::new(),
            policy: EntryPolicy::Unrestricted,
            release_gate_on_buy_failure: false,
            max_sell_attempts: 2,
            chain: FakeChain::new(),
            owner: Pubkey::new_unique(),
        }
    }

    pub fn token_account(&self, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(&self.owner, mint)
    }

    /// Wallet notification payload for `mint`
    pub fn wallet_update(&self, mint: Pubkey, amount: u64) -> (Pubkey, Vec<u8>) {
        (
            self.token_account(&mint),
            TokenAccountInfo {
                mint,
                owner: self.owner,
                amount,
            }
            .encode(),
        )
    }

    /// New pool installed on the fake chain, ready for `handle_pool`
    pub fn new_pool(&self) -> (Pubkey, LiquidityStateV4) {
        install_pool(&self.chain, RUN_TIMESTAMP + 60, 50 * ENTRY_AMOUNT)
    }
}

impl HarnessBuilder {
    pub fn filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// Filters that read the harness chain
    pub fn filters_with(self, build: impl FnOnce(Arc<FakeChain>) -> FilterChain) -> Self {
        let filters = build(self.chain.clone());
        self.filters(filters)
    }

    pub fn policy(mut self, policy: EntryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn release_gate_on_buy_failure(mut self, release: bool) -> Self {
        self.release_gate_on_buy_failure = release;
        self
    }

    pub fn max_sell_attempts(mut self, attempts: u32) -> Self {
        self.max_sell_attempts = attempts;
        self
    }

    pub fn chain(&self) -> Arc<FakeChain> {
        self.chain.clone()
    }

    pub fn build(self) -> Harness {
        let chain = self.chain;
        let owner = self.owner;
        let swaps = FakeSwapBuilder::new(owner);
        let broadcaster = FakeBroadcaster::new(chain.clone(), owner, FILL_TOKENS);
        let gate = Arc::new(PositionGate::new());
        let registry = Arc::new(TokenAccountRegistry::new());

        let settings = EngineSettings {
            owner,
            thresholds: thresholds(Duration::from_millis(100), Duration::from_millis(500)),
            run_timestamp: RUN_TIMESTAMP,
            release_gate_on_buy_failure: self.release_gate_on_buy_failure,
            max_sell_attempts: self.max_sell_attempts,
            fill_timeout: Duration::from_secs(1),
        };

        let engine = Engine::new(SniperContext {
            settings,
            reader: chain.clone(),
            registry: registry.clone(),
            gate: gate.clone(),
            policy: Arc::new(self.policy),
            filters: self.filters,
            swap_builder: swaps.clone(),
            broadcaster: broadcaster.clone(),
            quotes: FakeQuotes::constant(ENTRY_AMOUNT, FILL_TOKENS),
            market_data: None,
        });

        Harness {
            engine,
            chain,
            broadcaster,
            swaps,
            gate,
            registry,
            owner,
        }
    }
}
