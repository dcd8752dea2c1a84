//! Common types used throughout the application

use crate::errors::DecodeError;
use crate::layouts::{LiquidityStateV4, MinimalMarketV3};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// Program and mint addresses
// =============================================================================

pub const RAYDIUM_LIQUIDITY_PROGRAM_ID_V4: Pubkey =
    pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const OPENBOOK_PROGRAM_ID: Pubkey = pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");
pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");
pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");

/// Market record cached in the registry (event queue, bids, asks)
pub type MarketRecord = MinimalMarketV3;

/// Quote currency the sniper trades against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteToken {
    pub mint: Pubkey,
    pub decimals: u8,
    pub symbol: &'static str,
}

impl QuoteToken {
    pub fn wsol() -> Self {
        Self {
            mint: WSOL_MINT,
            decimals: 9,
            symbol: "WSOL",
        }
    }

    pub fn usdc() -> Self {
        Self {
            mint: USDC_MINT,
            decimals: 6,
            symbol: "USDC",
        }
    }

    /// Resolve a configured symbol (`WSOL` or `USDC`, case-insensitive)
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().to_ascii_uppercase().as_str() {
            "WSOL" => Some(Self::wsol()),
            "USDC" => Some(Self::usdc()),
            _ => None,
        }
    }

    pub fn is_native(&self) -> bool {
        self.mint == WSOL_MINT
    }

    /// Convert a UI amount to raw units, rounding up like the buy path expects
    pub fn to_raw(&self, ui_amount: f64) -> u64 {
        (ui_amount * 10f64.powi(self.decimals as i32)).ceil() as u64
    }

    pub fn to_ui(&self, raw: u64) -> f64 {
        raw as f64 / 10f64.powi(self.decimals as i32)
    }
}

/// Newly created pool as delivered by the pool subscription
///
/// Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCandidate {
    /// Pool account (AMM id)
    pub id: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub quote_vault: Pubkey,
    /// Unix timestamp at which the pool opens for swaps
    pub open_time: u64,
    /// Raw liquidity-state snapshot the candidate was decoded from
    pub state: LiquidityStateV4,
}

impl PoolCandidate {
    pub fn decode(id: Pubkey, data: &[u8]) -> Result<Self, DecodeError> {
        let state = LiquidityStateV4::decode(data)?;
        Ok(Self::from_state(id, state))
    }

    pub fn from_state(id: Pubkey, state: LiquidityStateV4) -> Self {
        Self {
            id,
            base_mint: state.base_mint,
            quote_mint: state.quote_mint,
            quote_vault: state.quote_vault,
            open_time: state.pool_open_time,
            state,
        }
    }

    pub fn dexscreener_url(&self) -> String {
        format!("https://dexscreener.com/solana/{}", self.id)
    }
}

/// Every account a Raydium AMM v4 swap touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolKeys {
    pub id: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub program_id: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub market_program_id: Pubkey,
    pub market_id: Pubkey,
    pub market_authority: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
}

impl PoolKeys {
    /// Assemble the key bundle from the pool state and its market record
    ///
    /// The pool's own vaults double as the market vaults; the swap
    /// instruction only needs them to be writable accounts of the right owner.
    pub fn derive(
        id: Pubkey,
        state: &LiquidityStateV4,
        market: &MarketRecord,
    ) -> Result<Self, DecodeError> {
        let (authority, _) =
            Pubkey::find_program_address(&[b"amm authority"], &RAYDIUM_LIQUIDITY_PROGRAM_ID_V4);
        let market_authority = market_authority(&state.market_id, &state.market_program_id)?;

        Ok(Self {
            id,
            base_mint: state.base_mint,
            quote_mint: state.quote_mint,
            lp_mint: state.lp_mint,
            base_decimals: u8::try_from(state.base_decimal)
                .map_err(|_| DecodeError::InvalidField("base_decimal"))?,
            quote_decimals: u8::try_from(state.quote_decimal)
                .map_err(|_| DecodeError::InvalidField("quote_decimal"))?,
            program_id: RAYDIUM_LIQUIDITY_PROGRAM_ID_V4,
            authority,
            open_orders: state.open_orders,
            target_orders: state.target_orders,
            base_vault: state.base_vault,
            quote_vault: state.quote_vault,
            market_program_id: state.market_program_id,
            market_id: state.market_id,
            market_authority,
            market_base_vault: state.base_vault,
            market_quote_vault: state.quote_vault,
            market_bids: market.bids,
            market_asks: market.asks,
            market_event_queue: market.event_queue,
        })
    }
}

/// Vault signer of an OpenBook market (first valid nonce below 100)
pub fn market_authority(market_id: &Pubkey, program_id: &Pubkey) -> Result<Pubkey, DecodeError> {
    (0u64..100)
        .find_map(|nonce| {
            Pubkey::create_program_address(&[market_id.as_ref(), &nonce.to_le_bytes()], program_id)
                .ok()
        })
        .ok_or(DecodeError::MarketAuthority(*market_id))
}

/// State of the single live trade
///
/// Created when a buy lands, dropped once the position is fully closed.
#[derive(Debug, Clone)]
pub struct TradeState {
    /// Target (base) mint
    pub mint: Pubkey,
    pub pool_keys: PoolKeys,
    /// Wallet's associated token account for the mint
    pub token_account: Pubkey,
    /// Quote spent on entry (raw units)
    pub entry_amount: u64,
    /// Unix timestamp (seconds) of the buy
    pub entry_timestamp: u64,
    /// Tokens received by the buy
    pub initial_tokens: u64,
    /// Tokens still held
    pub remaining_tokens: u64,
    /// Quote value of tokens already sold (raw units, estimated)
    pub realized_quote: u64,
    pub partial_taken: bool,
    pub checks_elapsed: u32,
}

impl TradeState {
    pub fn new(
        mint: Pubkey,
        pool_keys: PoolKeys,
        token_account: Pubkey,
        entry_amount: u64,
        tokens: u64,
    ) -> Self {
        Self {
            mint,
            pool_keys,
            token_account,
            entry_amount,
            entry_timestamp: unix_timestamp(),
            initial_tokens: tokens,
            remaining_tokens: tokens,
            realized_quote: 0,
            partial_taken: false,
            checks_elapsed: 0,
        }
    }

    /// Entry cost attributable to the tokens still held
    pub fn remaining_cost_basis(&self) -> f64 {
        if self.initial_tokens == 0 {
            return self.entry_amount as f64;
        }
        self.entry_amount as f64 * self.remaining_tokens as f64 / self.initial_tokens as f64
    }

    /// Percentage P&L of the held tokens given their current quote value
    pub fn pnl_percent(&self, current_value: u64) -> f64 {
        let basis = self.remaining_cost_basis();
        if basis <= 0.0 {
            return 0.0;
        }
        (current_value as f64 - basis) / basis * 100.0
    }
}

/// Current Unix time in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
