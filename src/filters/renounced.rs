use super::{FilterVerdict, PoolFilter, RejectReason};
use crate::oracles::TokenSafetyOracle;
use crate::types::PoolCandidate;
use async_trait::async_trait;
use std::sync::Arc;

/// Accepts only mints whose mint authority is renounced
pub struct RenouncedFilter {
    oracle: Arc<dyn TokenSafetyOracle>,
}

impl RenouncedFilter {
    pub fn new(oracle: Arc<dyn TokenSafetyOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl PoolFilter for RenouncedFilter {
    fn name(&self) -> &'static str {
        "renounced"
    }

    async fn check(&self, candidate: &PoolCandidate) -> FilterVerdict {
        match self.oracle.mint_authority_renounced(&candidate.base_mint).await {
            Ok(true) => FilterVerdict::Accept,
            Ok(false) => FilterVerdict::Reject(RejectReason::MintNotRenounced),
            Err(e) => FilterVerdict::Reject(RejectReason::LookupFailed(e.to_string())),
        }
    }
}
