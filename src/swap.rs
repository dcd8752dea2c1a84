//! Raydium AMM v4 swaps: quote math and instruction building
//!
//! The pipeline asks two things of this module: what a given amount is worth
//! against the current pool reserves ([`QuoteSource`]), and which
//! instructions perform the swap ([`SwapBuilder`]). Signing and submission
//! are the [`crate::broadcast`] module's job.

use crate::chain::ChainReader;
use crate::errors::{ExecutionError, LookupError};
use crate::types::{PoolKeys, QuoteToken};
use async_trait::async_trait;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::sync::Arc;

/// `swap_base_in` instruction tag
const SWAP_BASE_IN: u8 = 9;

/// Raydium AMM v4 trade fee, 25 / 10_000
const FEE_NUMERATOR: u128 = 25;
const FEE_DENOMINATOR: u128 = 10_000;

/// Direction of a swap relative to the quote token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Quote -> base
    Buy,
    /// Base -> quote; `close_account` closes the emptied base token account
    Sell { close_account: bool },
}

/// Constant-product output for `amount_in`, after the pool fee
pub fn compute_amount_out(amount_in: u64, reserve_in: u64, reserve_out: u64) -> u64 {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0;
    }
    let amount_in_with_fee = amount_in as u128 * (FEE_DENOMINATOR - FEE_NUMERATOR);
    let numerator = amount_in_with_fee * reserve_out as u128;
    let denominator = reserve_in as u128 * FEE_DENOMINATOR + amount_in_with_fee;
    (numerator / denominator) as u64
}

/// Worst acceptable output under `slippage_percent`
pub fn min_amount_out(amount_out: u64, slippage_percent: f64) -> u64 {
    let keep = (100.0 - slippage_percent.clamp(0.0, 100.0)) / 100.0;
    (amount_out as f64 * keep).floor() as u64
}

/// Expected and minimum output of a prospective swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub amount_out: u64,
    pub min_amount_out: u64,
}

/// Prices a sell of base tokens against the current pool reserves
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote_sell(&self, keys: &PoolKeys, token_amount: u64) -> Result<SwapQuote, LookupError>;
}

/// [`QuoteSource`] reading the pool vault balances
pub struct ReserveQuoteSource {
    reader: Arc<dyn ChainReader>,
    slippage_percent: f64,
}

impl ReserveQuoteSource {
    pub fn new(reader: Arc<dyn ChainReader>, slippage_percent: f64) -> Self {
        Self {
            reader,
            slippage_percent,
        }
    }
}

#[async_trait]
impl QuoteSource for ReserveQuoteSource {
    async fn quote_sell(&self, keys: &PoolKeys, token_amount: u64) -> Result<SwapQuote, LookupError> {
        let (base_reserve, quote_reserve) = tokio::try_join!(
            self.reader.token_balance(&keys.base_vault),
            self.reader.token_balance(&keys.quote_vault),
        )?;
        let amount_out = compute_amount_out(token_amount, base_reserve, quote_reserve);
        Ok(SwapQuote {
            amount_out,
            min_amount_out: min_amount_out(amount_out, self.slippage_percent),
        })
    }
}

/// Builds the instruction list of a swap
pub trait SwapBuilder: Send + Sync {
    fn build_swap(
        &self,
        keys: &PoolKeys,
        direction: SwapDirection,
        amount_in: u64,
        min_amount_out: u64,
    ) -> Result<Vec<Instruction>, ExecutionError>;
}

/// [`SwapBuilder`] for Raydium AMM v4 with the wallet's associated token accounts
pub struct RaydiumSwapBuilder {
    owner: Pubkey,
    quote: QuoteToken,
}

impl RaydiumSwapBuilder {
    pub fn new(owner: Pubkey, quote: QuoteToken) -> Self {
        Self { owner, quote }
    }

    fn ata(&self, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(&self.owner, mint)
    }

    fn create_ata(&self, mint: &Pubkey) -> Instruction {
        create_associated_token_account_idempotent(&self.owner, &self.owner, mint, &spl_token::id())
    }
}

impl SwapBuilder for RaydiumSwapBuilder {
    fn build_swap(
        &self,
        keys: &PoolKeys,
        direction: SwapDirection,
        amount_in: u64,
        min_amount_out: u64,
    ) -> Result<Vec<Instruction>, ExecutionError> {
        if keys.quote_mint != self.quote.mint {
            return Err(ExecutionError::InstructionBuild(format!(
                "pool {} is quoted in {}, wallet trades {}",
                keys.id, keys.quote_mint, self.quote.symbol
            )));
        }

        let base_ata = self.ata(&keys.base_mint);
        let quote_ata = self.ata(&keys.quote_mint);
        let mut instructions = Vec::with_capacity(6);

        match direction {
            SwapDirection::Buy => {
                if self.quote.is_native() {
                    instructions.push(self.create_ata(&keys.quote_mint));
                    instructions.push(system_instruction::transfer(&self.owner, &quote_ata, amount_in));
                    instructions.push(
                        spl_token::instruction::sync_native(&spl_token::id(), &quote_ata)
                            .map_err(|e| ExecutionError::InstructionBuild(e.to_string()))?,
                    );
                }
                instructions.push(self.create_ata(&keys.base_mint));
                instructions.push(swap_base_in(
                    keys,
                    &quote_ata,
                    &base_ata,
                    &self.owner,
                    amount_in,
                    min_amount_out,
                ));
            }
            SwapDirection::Sell { close_account } => {
                instructions.push(self.create_ata(&keys.quote_mint));
                instructions.push(swap_base_in(
                    keys,
                    &base_ata,
                    &quote_ata,
                    &self.owner,
                    amount_in,
                    min_amount_out,
                ));
                if close_account {
                    instructions.push(
                        spl_token::instruction::close_account(
                            &spl_token::id(),
                            &base_ata,
                            &self.owner,
                            &self.owner,
                            &[],
                        )
                        .map_err(|e| ExecutionError::InstructionBuild(e.to_string()))?,
                    );
                }
            }
        }
        Ok(instructions)
    }
}

/// Raydium AMM v4 `swap_base_in`
pub fn swap_base_in(
    keys: &PoolKeys,
    user_source: &Pubkey,
    user_destination: &Pubkey,
    owner: &Pubkey,
    amount_in: u64,
    min_amount_out: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(17);
    data.push(SWAP_BASE_IN);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_amount_out.to_le_bytes());

    let accounts = vec![
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new(keys.id, false),
        AccountMeta::new_readonly(keys.authority, false),
        AccountMeta::new(keys.open_orders, false),
        AccountMeta::new(keys.target_orders, false),
        AccountMeta::new(keys.base_vault, false),
        AccountMeta::new(keys.quote_vault, false),
        AccountMeta::new_readonly(keys.market_program_id, false),
        AccountMeta::new(keys.market_id, false),
        AccountMeta::new(keys.market_bids, false),
        AccountMeta::new(keys.market_asks, false),
        AccountMeta::new(keys.market_event_queue, false),
        AccountMeta::new(keys.market_base_vault, false),
        AccountMeta::new(keys.market_quote_vault, false),
        AccountMeta::new_readonly(keys.market_authority, false),
        AccountMeta::new(*user_source, false),
        AccountMeta::new(*user_destination, false),
        AccountMeta::new_readonly(*owner, true),
    ];

    Instruction {
        program_id: keys.program_id,
        accounts,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RAYDIUM_LIQUIDITY_PROGRAM_ID_V4, WSOL_MINT};

    fn keys(quote_mint: Pubkey) -> PoolKeys {
        PoolKeys {
            id: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            quote_mint,
            lp_mint: Pubkey::new_unique(),
            base_decimals: 6,
            quote_decimals: 9,
            program_id: RAYDIUM_LIQUIDITY_PROGRAM_ID_V4,
            authority: Pubkey::new_unique(),
            open_orders: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            market_program_id: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            market_authority: Pubkey::new_unique(),
            market_base_vault: Pubkey::new_unique(),
            market_quote_vault: Pubkey::new_unique(),
            market_bids: Pubkey::new_unique(),
            market_asks: Pubkey::new_unique(),
            market_event_queue: Pubkey::new_unique(),
        }
    }

    #[test]
    fn test_compute_amount_out() {
        // 1:1 pool, 1% of reserves in: output below input by fee and price impact
        let out = compute_amount_out(1_000, 100_000, 100_000);
        assert!(out < 1_000 && out > 980, "out = {out}");
        assert_eq!(compute_amount_out(0, 100, 100), 0);
        assert_eq!(compute_amount_out(10, 0, 100), 0);
    }

    #[test]
    fn test_min_amount_out() {
        assert_eq!(min_amount_out(1_000, 10.0), 900);
        assert_eq!(min_amount_out(1_000, 0.0), 1_000);
        assert_eq!(min_amount_out(999, 50.0), 499);
    }

    #[test]
    fn test_swap_instruction_layout() {
        let k = keys(WSOL_MINT);
        let owner = Pubkey::new_unique();
        let ix = swap_base_in(&k, &Pubkey::new_unique(), &Pubkey::new_unique(), &owner, 5, 3);
        assert_eq!(ix.accounts.len(), 18);
        assert_eq!(ix.data[0], 9);
        assert_eq!(u64::from_le_bytes(ix.data[1..9].try_into().unwrap()), 5);
        assert_eq!(u64::from_le_bytes(ix.data[9..17].try_into().unwrap()), 3);
        assert!(ix.accounts[17].is_signer);
        assert_eq!(ix.accounts[17].pubkey, owner);
    }

    #[test]
    fn test_wsol_buy_wraps_first() {
        let owner = Pubkey::new_unique();
        let builder = RaydiumSwapBuilder::new(owner, QuoteToken::wsol());
        let ixs = builder
            .build_swap(&keys(WSOL_MINT), SwapDirection::Buy, 1_000, 0)
            .unwrap();
        // create quote ATA, transfer, sync_native, create base ATA, swap
        assert_eq!(ixs.len(), 5);
        assert_eq!(ixs[4].program_id, RAYDIUM_LIQUIDITY_PROGRAM_ID_V4);
    }

    #[test]
    fn test_final_sell_closes_account() {
        let builder = RaydiumSwapBuilder::new(Pubkey::new_unique(), QuoteToken::wsol());
        let partial = builder
            .build_swap(&keys(WSOL_MINT), SwapDirection::Sell { close_account: false }, 10, 0)
            .unwrap();
        let full = builder
            .build_swap(&keys(WSOL_MINT), SwapDirection::Sell { close_account: true }, 10, 0)
            .unwrap();
        assert_eq!(full.len(), partial.len() + 1);
        assert_eq!(full.last().unwrap().program_id, spl_token::id());
    }

    #[test]
    fn test_quote_mismatch_rejected() {
        let builder = RaydiumSwapBuilder::new(Pubkey::new_unique(), QuoteToken::usdc());
        assert!(matches!(
            builder.build_swap(&keys(WSOL_MINT), SwapDirection::Buy, 1, 0),
            Err(ExecutionError::InstructionBuild(_))
        ));
    }
}
