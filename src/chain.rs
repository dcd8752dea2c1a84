//! Read access to chain state
//!
//! [`ChainReader`] is the seam between the pipeline and the RPC node. The
//! engine, the executors and the safety oracle only read accounts through it,
//! which lets tests drive the whole pipeline from in-memory account maps.

use crate::errors::LookupError;
use crate::layouts::{MinimalMarketV3, TokenAccountInfo};
use crate::types::MarketRecord;
use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

/// Account reads used by the pipeline
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Raw account data, `None` if the account does not exist
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LookupError>;

    /// Native balance in lamports
    async fn lamports(&self, address: &Pubkey) -> Result<u64, LookupError>;

    /// Every SPL token account owned by `owner`
    async fn wallet_token_accounts(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<(Pubkey, TokenAccountInfo)>, LookupError>;

    /// Token balance of an SPL token account; a missing account holds nothing
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, LookupError> {
        match self.account_data(token_account).await? {
            Some(data) => Ok(TokenAccountInfo::decode(&data)?.amount),
            None => Ok(0),
        }
    }

    /// Fetch and decode an OpenBook market
    async fn market(&self, market_id: &Pubkey) -> Result<MarketRecord, LookupError> {
        let data = self
            .account_data(market_id)
            .await?
            .ok_or(LookupError::AccountNotFound(*market_id))?;
        Ok(MinimalMarketV3::decode(&data)?)
    }
}

/// [`ChainReader`] backed by the nonblocking RPC client
pub struct RpcChainReader {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcChainReader {
    pub fn new(client: Arc<RpcClient>, commitment: CommitmentConfig) -> Self {
        Self { client, commitment }
    }

    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LookupError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| LookupError::Rpc(e.to_string()))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn lamports(&self, address: &Pubkey) -> Result<u64, LookupError> {
        let response = self
            .client
            .get_balance_with_commitment(address, self.commitment)
            .await
            .map_err(|e| LookupError::Rpc(e.to_string()))?;
        Ok(response.value)
    }

    async fn wallet_token_accounts(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<(Pubkey, TokenAccountInfo)>, LookupError> {
        let config = RpcProgramAccountsConfig {
            filters: Some(wallet_token_account_filters(owner)),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                data_slice: None,
                commitment: Some(self.commitment),
                min_context_slot: None,
            },
            with_context: None,
            sort_results: None,
        };

        let accounts = self
            .client
            .get_program_accounts_with_config(&spl_token::id(), config)
            .await
            .map_err(|e| LookupError::Rpc(e.to_string()))?;

        Ok(accounts
            .into_iter()
            .filter_map(|(address, account)| {
                TokenAccountInfo::decode(&account.data)
                    .ok()
                    .map(|info| (address, info))
            })
            .collect())
    }
}

/// Filters selecting SPL token accounts owned by `owner`
pub fn wallet_token_account_filters(owner: &Pubkey) -> Vec<RpcFilterType> {
    vec![
        RpcFilterType::DataSize(TokenAccountInfo::SPAN as u64),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            TokenAccountInfo::OWNER_OFFSET,
            owner.as_ref(),
        )),
    ]
}
