use super::{FilterVerdict, PoolFilter, RejectReason};
use crate::oracles::TokenSafetyOracle;
use crate::types::PoolCandidate;
use async_trait::async_trait;
use std::sync::Arc;

/// Rejects mints whose Metaplex metadata can still be changed.
/// A mint without metadata is rejected as well.
pub struct MutableFilter {
    oracle: Arc<dyn TokenSafetyOracle>,
}

impl MutableFilter {
    pub fn new(oracle: Arc<dyn TokenSafetyOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl PoolFilter for MutableFilter {
    fn name(&self) -> &'static str {
        "mutable"
    }

    async fn check(&self, candidate: &PoolCandidate) -> FilterVerdict {
        match self.oracle.metadata_mutable(&candidate.base_mint).await {
            Ok(Some(false)) => FilterVerdict::Accept,
            Ok(Some(true)) => FilterVerdict::Reject(RejectReason::MutableMetadata),
            Ok(None) => FilterVerdict::Reject(RejectReason::MetadataMissing),
            Err(e) => FilterVerdict::Reject(RejectReason::LookupFailed(e.to_string())),
        }
    }
}
