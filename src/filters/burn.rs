use super::{FilterVerdict, PoolFilter, RejectReason};
use crate::oracles::TokenSafetyOracle;
use crate::types::PoolCandidate;
use async_trait::async_trait;
use std::sync::Arc;

/// Accepts only pools whose LP supply has been burned to zero
pub struct BurnFilter {
    oracle: Arc<dyn TokenSafetyOracle>,
}

impl BurnFilter {
    pub fn new(oracle: Arc<dyn TokenSafetyOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl PoolFilter for BurnFilter {
    fn name(&self) -> &'static str {
        "burn"
    }

    async fn check(&self, candidate: &PoolCandidate) -> FilterVerdict {
        match self.oracle.lp_fully_burned(&candidate.state.lp_mint).await {
            Ok(Some(true)) => FilterVerdict::Accept,
            Ok(Some(false)) => FilterVerdict::Reject(RejectReason::LiquidityNotBurned),
            Ok(None) => FilterVerdict::Reject(RejectReason::LpMintMissing),
            Err(e) => FilterVerdict::Reject(RejectReason::LookupFailed(e.to_string())),
        }
    }
}
