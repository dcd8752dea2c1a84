//! Buy Executor
//!
//! Turns an eligible [`PoolCandidate`] into a landed quote -> base swap:
//! resolve (or lazily create) the registry record of the base mint, fetch
//! the market if it was never seen on the market feed, derive the pool keys,
//! then hand the instructions to the [`Broadcaster`].
//!
//! The executor never touches the position gate. What happens to the gate
//! after a failure is the engine's decision.

use crate::broadcast::Broadcaster;
use crate::chain::ChainReader;
use crate::errors::{ExecutionError, LookupError};
use crate::metrics::{metrics, Timer};
use crate::registry::{TokenAccountRecord, TokenAccountRegistry};
use crate::structured_logging::PipelineContext;
use crate::swap::{SwapBuilder, SwapDirection};
use crate::types::{MarketRecord, PoolCandidate, PoolKeys};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;
use tracing::debug;

/// A buy that landed
#[derive(Debug, Clone)]
pub struct BuyReceipt {
    pub signature: Signature,
    pub mint: Pubkey,
    /// Wallet token account receiving the base tokens
    pub token_account: Pubkey,
    pub pool_keys: PoolKeys,
    /// Quote spent (raw units)
    pub entry_amount: u64,
}

pub struct BuyExecutor {
    reader: Arc<dyn ChainReader>,
    registry: Arc<TokenAccountRegistry>,
    swap_builder: Arc<dyn SwapBuilder>,
    broadcaster: Arc<dyn Broadcaster>,
    owner: Pubkey,
    quote_amount: u64,
}

impl BuyExecutor {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        registry: Arc<TokenAccountRegistry>,
        swap_builder: Arc<dyn SwapBuilder>,
        broadcaster: Arc<dyn Broadcaster>,
        owner: Pubkey,
        quote_amount: u64,
    ) -> Self {
        Self {
            reader,
            registry,
            swap_builder,
            broadcaster,
            owner,
            quote_amount,
        }
    }

    pub async fn buy(
        &self,
        candidate: &PoolCandidate,
        ctx: &PipelineContext,
    ) -> Result<BuyReceipt, ExecutionError> {
        let timer = Timer::new();
        ctx.logger.log_buy_attempt(&candidate.base_mint, self.quote_amount);

        let result = self.execute(candidate).await;
        timer.observe_duration(&metrics().buy_latency);

        match &result {
            Ok(receipt) => {
                metrics().buys_submitted.inc();
                ctx.logger
                    .log_buy_success(&receipt.mint, &receipt.signature, timer.elapsed_ms());
            }
            Err(e) => {
                metrics().buys_failed.inc();
                ctx.logger
                    .log_buy_failure(&candidate.base_mint, &e.to_string(), timer.elapsed_ms());
            }
        }
        result
    }

    async fn execute(&self, candidate: &PoolCandidate) -> Result<BuyReceipt, ExecutionError> {
        let (record, market) = self.resolve_record(candidate).await?;

        let pool_keys = PoolKeys::derive(candidate.id, &candidate.state, &market)
            .map_err(|e| ExecutionError::Lookup(LookupError::Decode(e)))?;
        self.registry.set_pool_keys(&candidate.base_mint, pool_keys);

        let instructions =
            self.swap_builder
                .build_swap(&pool_keys, SwapDirection::Buy, self.quote_amount, 0)?;
        let signature = self.broadcaster.submit(instructions).await?;

        Ok(BuyReceipt {
            signature,
            mint: candidate.base_mint,
            token_account: record.address,
            pool_keys,
            entry_amount: self.quote_amount,
        })
    }

    /// Registry record of the base mint, with its market filled in
    async fn resolve_record(
        &self,
        candidate: &PoolCandidate,
    ) -> Result<(TokenAccountRecord, MarketRecord), ExecutionError> {
        if let Some(record) = self.registry.get(&candidate.base_mint) {
            if let Some(market) = record.market {
                return Ok((record, market));
            }
        }

        debug!(market = %candidate.state.market_id, "Market not cached, fetching");
        let market = self.reader.market(&candidate.state.market_id).await?;
        let address = get_associated_token_address(&self.owner, &candidate.base_mint);
        let record = self.registry.save_market(candidate.base_mint, address, market);
        metrics().registry_size.set(self.registry.len() as i64);
        Ok((record, market))
    }
}
