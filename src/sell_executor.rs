//! Sell Executor
//!
//! Sells base tokens back into the quote token through the same swap builder
//! the buy path uses. A partial sell is attempted up to `max_attempts` times
//! and stops at the first landed transaction. A final sell keeps going until
//! the token account is empty or the attempts run out; it also closes the
//! emptied account.

use crate::broadcast::Broadcaster;
use crate::chain::ChainReader;
use crate::errors::{ExecutionError, SellError};
use crate::metrics::{metrics, Timer};
use crate::structured_logging::PipelineContext;
use crate::swap::{QuoteSource, SwapBuilder, SwapDirection};
use crate::types::PoolKeys;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a successful `sell` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellOutcome {
    /// Nothing held, no transaction was sent
    NothingToSell,
    /// Partial sell landed
    Partial { signature: Signature, amount: u64 },
    /// Token account drained. `signature` is the last landed sell, if any.
    Closed {
        signature: Option<Signature>,
        attempts: u32,
    },
}

pub struct SellExecutor {
    reader: Arc<dyn ChainReader>,
    quotes: Arc<dyn QuoteSource>,
    swap_builder: Arc<dyn SwapBuilder>,
    broadcaster: Arc<dyn Broadcaster>,
    max_attempts: u32,
}

impl SellExecutor {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        quotes: Arc<dyn QuoteSource>,
        swap_builder: Arc<dyn SwapBuilder>,
        broadcaster: Arc<dyn Broadcaster>,
        max_attempts: u32,
    ) -> Self {
        Self {
            reader,
            quotes,
            swap_builder,
            broadcaster,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Sell `amount` base tokens held in `token_account`
    ///
    /// An `amount` of 0 is a no-op. For a final sell the on-chain balance,
    /// when readable, replaces `amount`.
    pub async fn sell(
        &self,
        keys: &PoolKeys,
        token_account: &Pubkey,
        amount: u64,
        is_final: bool,
        ctx: &PipelineContext,
    ) -> Result<SellOutcome, SellError> {
        if amount == 0 {
            debug!(mint = %keys.base_mint, "Nothing to sell");
            return Ok(SellOutcome::NothingToSell);
        }
        let timer = Timer::new();
        let result = if is_final {
            self.sell_all(keys, token_account, amount, ctx).await
        } else {
            self.sell_partial(keys, amount, ctx).await
        };
        timer.observe_duration(&metrics().sell_latency);
        result
    }

    async fn sell_partial(
        &self,
        keys: &PoolKeys,
        amount: u64,
        ctx: &PipelineContext,
    ) -> Result<SellOutcome, SellError> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                metrics().sell_retries.inc();
            }
            match self.submit(keys, amount, false).await {
                Ok(signature) => {
                    ctx.logger
                        .log_sell_operation(&keys.base_mint, amount, false, &signature);
                    return Ok(SellOutcome::Partial { signature, amount });
                }
                Err(e) => {
                    warn!(mint = %keys.base_mint, attempt, error = %e, "Partial sell failed");
                    last_error = Some(e);
                }
            }
        }
        Err(SellError::PartialFailed {
            mint: keys.base_mint,
            attempts: self.max_attempts,
            source: last_error
                .unwrap_or_else(|| ExecutionError::Broadcast("no attempt made".to_string())),
        })
    }

    async fn sell_all(
        &self,
        keys: &PoolKeys,
        token_account: &Pubkey,
        amount: u64,
        ctx: &PipelineContext,
    ) -> Result<SellOutcome, SellError> {
        let mut remaining = self.balance_or(token_account, amount).await;
        let mut last_signature = None;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if remaining == 0 {
                return Ok(SellOutcome::Closed {
                    signature: last_signature,
                    attempts: attempt - 1,
                });
            }
            if attempt > 1 {
                metrics().sell_retries.inc();
            }

            match self.submit(keys, remaining, true).await {
                Ok(signature) => {
                    ctx.logger
                        .log_sell_operation(&keys.base_mint, remaining, true, &signature);
                    last_signature = Some(signature);
                    // A landed final sell closes the account, which requires a zero balance
                    remaining = self.balance_or(token_account, 0).await;
                }
                Err(e) => {
                    warn!(mint = %keys.base_mint, attempt, error = %e, "Final sell failed");
                    last_error = Some(e.to_string());
                    remaining = self.balance_or(token_account, remaining).await;
                }
            }
        }

        if remaining == 0 {
            return Ok(SellOutcome::Closed {
                signature: last_signature,
                attempts: self.max_attempts,
            });
        }
        Err(SellError::Exhausted {
            mint: keys.base_mint,
            attempts: self.max_attempts,
            remaining,
            last_error,
        })
    }

    async fn submit(
        &self,
        keys: &PoolKeys,
        amount: u64,
        close_account: bool,
    ) -> Result<Signature, ExecutionError> {
        let min_out = match self.quotes.quote_sell(keys, amount).await {
            Ok(quote) => quote.min_amount_out,
            Err(e) => {
                warn!(mint = %keys.base_mint, error = %e, "Sell quote unavailable, selling without a floor");
                0
            }
        };
        let instructions = self.swap_builder.build_swap(
            keys,
            SwapDirection::Sell { close_account },
            amount,
            min_out,
        )?;
        self.broadcaster.submit(instructions).await
    }

    async fn balance_or(&self, token_account: &Pubkey, fallback: u64) -> u64 {
        match self.reader.token_balance(token_account).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(account = %token_account, error = %e, "Balance refresh failed");
                fallback
            }
        }
    }
}
