//! External lookups backing the eligibility filters
//!
//! - [`TokenSafetyOracle`]: mint authority, metadata mutability and LP burn
//!   status, read from chain through a [`ChainReader`]
//! - [`SocialLookup`] / [`MarketDataProvider`]: DexScreener token and pair
//!   endpoints, rate limited client-side with `governor`
//!
//! Every method returns a [`LookupError`] on transient failure; the filters
//! turn those into rejections.

use crate::chain::ChainReader;
use crate::config::MarketDataConfig;
use crate::errors::LookupError;
use crate::layouts::{MintInfo, TokenMetadata};
use crate::types::METADATA_PROGRAM_ID;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Social link types counted as a real presence
const RECOGNIZED_SOCIALS: [&str; 3] = ["twitter", "telegram", "discord"];

/// Mint / metadata / LP status lookups
#[async_trait]
pub trait TokenSafetyOracle: Send + Sync {
    /// True when the mint has no mint authority
    async fn mint_authority_renounced(&self, mint: &Pubkey) -> Result<bool, LookupError>;

    /// `Some(is_mutable)` from the Metaplex metadata, `None` if the mint has none
    async fn metadata_mutable(&self, mint: &Pubkey) -> Result<Option<bool>, LookupError>;

    /// `Some(supply == 0)` for the LP mint, `None` if the mint does not exist
    async fn lp_fully_burned(&self, lp_mint: &Pubkey) -> Result<Option<bool>, LookupError>;
}

/// Social-presence lookup
#[async_trait]
pub trait SocialLookup: Send + Sync {
    async fn has_socials(&self, mint: &Pubkey) -> Result<bool, LookupError>;
}

/// Pair statistics for a pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairStats {
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_h24: Option<f64>,
    pub price_change_h1: Option<f64>,
    pub price_change_h24: Option<f64>,
    pub url: Option<String>,
}

/// Market statistics lookup keyed by pool id
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn pair_stats(&self, pool_id: &Pubkey) -> Result<Option<PairStats>, LookupError>;
}

// =============================================================================
// On-chain oracle
// =============================================================================

/// [`TokenSafetyOracle`] reading mint and metadata accounts
pub struct RpcSafetyOracle {
    reader: Arc<dyn ChainReader>,
}

impl RpcSafetyOracle {
    pub fn new(reader: Arc<dyn ChainReader>) -> Self {
        Self { reader }
    }

    async fn mint_info(&self, mint: &Pubkey) -> Result<Option<MintInfo>, LookupError> {
        match self.reader.account_data(mint).await? {
            Some(data) => Ok(Some(MintInfo::decode(&data)?)),
            None => Ok(None),
        }
    }
}

/// Metaplex metadata PDA of `mint`
pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

#[async_trait]
impl TokenSafetyOracle for RpcSafetyOracle {
    async fn mint_authority_renounced(&self, mint: &Pubkey) -> Result<bool, LookupError> {
        let info = self
            .mint_info(mint)
            .await?
            .ok_or(LookupError::AccountNotFound(*mint))?;
        Ok(info.mint_authority.is_none())
    }

    async fn metadata_mutable(&self, mint: &Pubkey) -> Result<Option<bool>, LookupError> {
        let address = metadata_address(mint);
        match self.reader.account_data(&address).await? {
            Some(data) => Ok(Some(TokenMetadata::decode(&data)?.is_mutable)),
            None => Ok(None),
        }
    }

    async fn lp_fully_burned(&self, lp_mint: &Pubkey) -> Result<Option<bool>, LookupError> {
        Ok(self.mint_info(lp_mint).await?.map(|info| info.supply == 0))
    }
}

// =============================================================================
// DexScreener
// =============================================================================

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    price_usd: Option<String>,
    #[serde(default)]
    liquidity: Option<DexLiquidity>,
    #[serde(default)]
    volume: Option<DexWindow>,
    #[serde(default)]
    price_change: Option<DexWindow>,
    #[serde(default)]
    info: Option<DexInfo>,
}

#[derive(Debug, Deserialize)]
struct DexLiquidity {
    #[serde(default)]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexWindow {
    #[serde(default)]
    h1: Option<f64>,
    #[serde(default)]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexInfo {
    #[serde(default)]
    socials: Vec<DexSocial>,
}

#[derive(Debug, Deserialize)]
struct DexSocial {
    #[serde(rename = "type", default)]
    kind: String,
}

impl DexPair {
    fn has_recognized_social(&self) -> bool {
        self.info.as_ref().is_some_and(|info| {
            info.socials
                .iter()
                .any(|s| RECOGNIZED_SOCIALS.contains(&s.kind.to_ascii_lowercase().as_str()))
        })
    }

    fn stats(&self) -> PairStats {
        PairStats {
            price_usd: self.price_usd.as_deref().and_then(|p| p.parse().ok()),
            liquidity_usd: self.liquidity.as_ref().and_then(|l| l.usd),
            volume_h24: self.volume.as_ref().and_then(|v| v.h24),
            price_change_h1: self.price_change.as_ref().and_then(|p| p.h1),
            price_change_h24: self.price_change.as_ref().and_then(|p| p.h24),
            url: self.url.clone(),
        }
    }
}

/// DexScreener HTTP client
pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
}

impl DexScreenerClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self, LookupError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LookupError::Http(e.to_string()))?;
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url: config.dexscreener_base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    async fn fetch_pairs(&self, path: &str) -> Result<Vec<DexPair>, LookupError> {
        if self.limiter.check().is_err() {
            return Err(LookupError::RateLimited);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "DexScreener request");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LookupError::Http(format!("{} returned {}", url, response.status())));
        }

        let body: PairsResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;
        Ok(body.pairs.unwrap_or_default())
    }
}

#[async_trait]
impl SocialLookup for DexScreenerClient {
    async fn has_socials(&self, mint: &Pubkey) -> Result<bool, LookupError> {
        let pairs = self
            .fetch_pairs(&format!("/latest/dex/tokens/{mint}"))
            .await?;
        Ok(pairs.iter().any(DexPair::has_recognized_social))
    }
}

#[async_trait]
impl MarketDataProvider for DexScreenerClient {
    async fn pair_stats(&self, pool_id: &Pubkey) -> Result<Option<PairStats>, LookupError> {
        let pairs = self
            .fetch_pairs(&format!("/latest/dex/pairs/solana/{pool_id}"))
            .await?;
        Ok(pairs.first().map(DexPair::stats))
    }
}
