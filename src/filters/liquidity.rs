//! Pool size bounds on the quote vault

use super::{FilterVerdict, PoolFilter, RejectReason};
use crate::chain::ChainReader;
use crate::types::PoolCandidate;
use async_trait::async_trait;
use std::sync::Arc;

/// Rejects pools whose quote-vault balance is outside `[min, max]`.
/// A bound of 0 is disabled.
pub struct LiquidityFilter {
    reader: Arc<dyn ChainReader>,
    min: u64,
    max: u64,
}

impl LiquidityFilter {
    pub fn new(reader: Arc<dyn ChainReader>, min: u64, max: u64) -> Self {
        Self { reader, min, max }
    }

    fn judge(&self, balance: u64) -> FilterVerdict {
        if self.min > 0 && balance < self.min {
            return FilterVerdict::Reject(RejectReason::PoolTooSmall {
                balance,
                min: self.min,
            });
        }
        if self.max > 0 && balance > self.max {
            return FilterVerdict::Reject(RejectReason::PoolTooLarge {
                balance,
                max: self.max,
            });
        }
        FilterVerdict::Accept
    }
}

#[async_trait]
impl PoolFilter for LiquidityFilter {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    async fn check(&self, candidate: &PoolCandidate) -> FilterVerdict {
        match self.reader.token_balance(&candidate.quote_vault).await {
            Ok(balance) => self.judge(balance),
            Err(e) => FilterVerdict::Reject(RejectReason::LookupFailed(e.to_string())),
        }
    }
}
