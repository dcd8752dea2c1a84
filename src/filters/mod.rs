//! Eligibility Filter Chain
//!
//! Filters run in a fixed order and the chain stops at the first rejection:
//!
//! 1. [`LiquidityFilter`]: quote-vault balance within the configured bounds
//! 2. [`RenouncedFilter`]: mint authority renounced
//! 3. [`SocialFilter`]: recognized social links on DexScreener
//! 4. [`MutableFilter`]: metadata not mutable
//! 5. [`BurnFilter`]: LP supply fully burned
//!
//! Filters only read external data. A failed lookup is a rejection
//! ([`RejectReason::LookupFailed`]), never an error that escapes the chain.

mod burn;
mod liquidity;
mod mutable;
mod renounced;
mod social;

pub use burn::BurnFilter;
pub use liquidity::LiquidityFilter;
pub use mutable::MutableFilter;
pub use renounced::RenouncedFilter;
pub use social::SocialFilter;

use crate::chain::ChainReader;
use crate::config::{FilterConfig, Thresholds};
use crate::oracles::{SocialLookup, TokenSafetyOracle};
use crate::types::PoolCandidate;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why a candidate was turned away
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("pool size {balance} below minimum {min}")]
    PoolTooSmall { balance: u64, min: u64 },

    #[error("pool size {balance} above maximum {max}")]
    PoolTooLarge { balance: u64, max: u64 },

    #[error("mint authority not renounced")]
    MintNotRenounced,

    #[error("no recognized social links")]
    NoSocials,

    #[error("metadata is mutable")]
    MutableMetadata,

    #[error("metadata account missing")]
    MetadataMissing,

    #[error("liquidity not burned")]
    LiquidityNotBurned,

    #[error("LP mint missing")]
    LpMintMissing,

    #[error("lookup failed: {0}")]
    LookupFailed(String),
}

/// Result of a single filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    Accept,
    Reject(RejectReason),
}

/// Result of the whole chain
#[derive(Debug, Clone, PartialEq)]
pub enum ChainVerdict {
    Accept,
    Reject {
        filter: &'static str,
        reason: RejectReason,
    },
}

impl ChainVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, ChainVerdict::Accept)
    }
}

/// One eligibility predicate
#[async_trait]
pub trait PoolFilter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, candidate: &PoolCandidate) -> FilterVerdict;
}

/// Ordered, short-circuiting list of filters
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn PoolFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl PoolFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Standard chain for the configured toggles
    pub fn from_config(
        toggles: &FilterConfig,
        thresholds: &Thresholds,
        reader: Arc<dyn ChainReader>,
        oracle: Arc<dyn TokenSafetyOracle>,
        social: Arc<dyn SocialLookup>,
    ) -> Self {
        let mut chain = Self::new();
        if thresholds.min_pool_size > 0 || thresholds.max_pool_size > 0 {
            chain = chain.with_filter(LiquidityFilter::new(
                reader,
                thresholds.min_pool_size,
                thresholds.max_pool_size,
            ));
        }
        if toggles.check_renounced {
            chain = chain.with_filter(RenouncedFilter::new(oracle.clone()));
        }
        if toggles.check_social {
            chain = chain.with_filter(SocialFilter::new(social));
        }
        if toggles.check_mutable {
            chain = chain.with_filter(MutableFilter::new(oracle.clone()));
        }
        if toggles.check_burned {
            chain = chain.with_filter(BurnFilter::new(oracle));
        }
        chain
    }

    /// Run the filters in order, stopping at the first rejection
    pub async fn evaluate(&self, candidate: &PoolCandidate) -> ChainVerdict {
        for filter in &self.filters {
            match filter.check(candidate).await {
                FilterVerdict::Accept => {
                    debug!(filter = filter.name(), mint = %candidate.base_mint, "Filter passed");
                }
                FilterVerdict::Reject(reason) => {
                    return ChainVerdict::Reject {
                        filter: filter.name(),
                        reason,
                    };
                }
            }
        }
        ChainVerdict::Accept
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
