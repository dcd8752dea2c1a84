use super::{FilterVerdict, PoolFilter, RejectReason};
use crate::oracles::SocialLookup;
use crate::types::PoolCandidate;
use async_trait::async_trait;
use std::sync::Arc;

/// Accepts only mints with recognized social links. Fail-closed.
pub struct SocialFilter {
    lookup: Arc<dyn SocialLookup>,
}

impl SocialFilter {
    pub fn new(lookup: Arc<dyn SocialLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl PoolFilter for SocialFilter {
    fn name(&self) -> &'static str {
        "social"
    }

    async fn check(&self, candidate: &PoolCandidate) -> FilterVerdict {
        match self.lookup.has_socials(&candidate.base_mint).await {
            Ok(true) => FilterVerdict::Accept,
            Ok(false) => FilterVerdict::Reject(RejectReason::NoSocials),
            Err(e) => FilterVerdict::Reject(RejectReason::LookupFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LookupError;
    use crate::layouts::LiquidityStateV4;
    use solana_sdk::pubkey::Pubkey;

    struct Fixed(Result<bool, LookupError>);

    #[async_trait]
    impl SocialLookup for Fixed {
        async fn has_socials(&self, _mint: &Pubkey) -> Result<bool, LookupError> {
            self.0.clone()
        }
    }

    fn candidate() -> PoolCandidate {
        PoolCandidate::decode(Pubkey::new_unique(), &vec![0u8; LiquidityStateV4::SPAN]).unwrap()
    }

    #[tokio::test]
    async fn test_verdicts() {
        let accept = SocialFilter::new(Arc::new(Fixed(Ok(true))));
        assert_eq!(accept.check(&candidate()).await, FilterVerdict::Accept);

        let reject = SocialFilter::new(Arc::new(Fixed(Ok(false))));
        assert_eq!(
            reject.check(&candidate()).await,
            FilterVerdict::Reject(RejectReason::NoSocials)
        );

        let failing = SocialFilter::new(Arc::new(Fixed(Err(LookupError::RateLimited))));
        assert_eq!(
            failing.check(&candidate()).await,
            FilterVerdict::Reject(RejectReason::LookupFailed("Rate limited".into()))
        );
    }
}
