//! WebSocket subscriptions feeding the pipeline
//!
//! Four subscriptions share one `PubsubClient`:
//! - new Raydium AMM v4 pools quoted in the configured quote mint
//! - OpenBook markets quoted in the configured quote mint
//! - the wallet's SPL token accounts (fill detection)
//! - transaction logs mentioning the wallet's quote token account
//!
//! Every notification is forwarded as a [`StreamEvent`]; decoding into
//! domain types happens in the engine.

use crate::chain::wallet_token_account_filters;
use crate::layouts::{LiquidityStateV4, MinimalMarketV3};
use crate::types::{OPENBOOK_PROGRAM_ID, RAYDIUM_LIQUIDITY_PROGRAM_ID_V4};
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use solana_account_decoder::{UiAccountData, UiAccountEncoding};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcTransactionLogsConfig,
    RpcTransactionLogsFilter,
};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_response::RpcKeyedAccount;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Raw notification delivered to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Pool { id: Pubkey, data: Vec<u8> },
    Market { id: Pubkey, data: Vec<u8> },
    WalletAccount { address: Pubkey, data: Vec<u8> },
    WalletTransaction { signature: String, failed: bool },
}

#[derive(Debug, Clone, Copy)]
enum AccountFeed {
    Pools,
    Markets,
    Wallet,
}

impl AccountFeed {
    fn event(self, id: Pubkey, data: Vec<u8>) -> StreamEvent {
        match self {
            AccountFeed::Pools => StreamEvent::Pool { id, data },
            AccountFeed::Markets => StreamEvent::Market { id, data },
            AccountFeed::Wallet => StreamEvent::WalletAccount { address: id, data },
        }
    }

    fn name(self) -> &'static str {
        match self {
            AccountFeed::Pools => "pools",
            AccountFeed::Markets => "markets",
            AccountFeed::Wallet => "wallet",
        }
    }
}

/// Swap-enabled AMM v4 pools quoted in `quote_mint` and backed by OpenBook
pub fn pool_filters(quote_mint: &Pubkey) -> Vec<RpcFilterType> {
    vec![
        RpcFilterType::DataSize(LiquidityStateV4::SPAN as u64),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            LiquidityStateV4::QUOTE_MINT_OFFSET,
            quote_mint.as_ref(),
        )),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            LiquidityStateV4::MARKET_PROGRAM_ID_OFFSET,
            OPENBOOK_PROGRAM_ID.as_ref(),
        )),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            LiquidityStateV4::STATUS_OFFSET,
            &LiquidityStateV4::STATUS_SWAP_ONLY.to_le_bytes(),
        )),
    ]
}

/// OpenBook markets quoted in `quote_mint`
pub fn market_filters(quote_mint: &Pubkey) -> Vec<RpcFilterType> {
    vec![
        RpcFilterType::DataSize(MinimalMarketV3::SPAN as u64),
        RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            MinimalMarketV3::QUOTE_MINT_OFFSET,
            quote_mint.as_ref(),
        )),
    ]
}

/// Address and raw bytes of a keyed account notification
pub fn decode_keyed_account(account: &RpcKeyedAccount) -> Option<(Pubkey, Vec<u8>)> {
    let pubkey = Pubkey::from_str(&account.pubkey).ok()?;
    let data = match &account.account.data {
        UiAccountData::Binary(data, UiAccountEncoding::Base58) => bs58::decode(data).into_vec().ok()?,
        UiAccountData::Binary(data, _) => BASE64.decode(data).ok()?,
        UiAccountData::LegacyBinary(data) => bs58::decode(data).into_vec().ok()?,
        UiAccountData::Json(_) => return None,
    };
    Some((pubkey, data))
}

/// WebSocket streaming client for the sniper's subscriptions
pub struct WebSocketStream {
    ws_url: String,
    commitment: CommitmentConfig,
}

impl WebSocketStream {
    pub fn new(ws_url: String, commitment: CommitmentConfig) -> Self {
        Self { ws_url, commitment }
    }

    /// Connect to WebSocket endpoint and return client
    pub async fn connect(&self) -> Result<Arc<PubsubClient>> {
        info!("Connecting to WebSocket: {}", self.ws_url);

        let client = PubsubClient::new(&self.ws_url)
            .await
            .with_context(|| format!("Failed to connect to {}", self.ws_url))?;

        info!("WebSocket connected successfully");
        Ok(Arc::new(client))
    }

    /// Start every subscription of the sniper on `client`
    pub fn subscribe_all(
        &self,
        client: Arc<PubsubClient>,
        quote_mint: &Pubkey,
        owner: &Pubkey,
        quote_token_account: &Pubkey,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) {
        self.subscribe_accounts(
            client.clone(),
            RAYDIUM_LIQUIDITY_PROGRAM_ID_V4,
            pool_filters(quote_mint),
            AccountFeed::Pools,
            tx.clone(),
        );
        self.subscribe_accounts(
            client.clone(),
            OPENBOOK_PROGRAM_ID,
            market_filters(quote_mint),
            AccountFeed::Markets,
            tx.clone(),
        );
        self.subscribe_accounts(
            client.clone(),
            spl_token::id(),
            wallet_token_account_filters(owner),
            AccountFeed::Wallet,
            tx.clone(),
        );
        self.subscribe_logs(client, *quote_token_account, tx);
    }

    fn subscribe_accounts(
        &self,
        client: Arc<PubsubClient>,
        program_id: Pubkey,
        filters: Vec<RpcFilterType>,
        feed: AccountFeed,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) {
        info!(feed = feed.name(), program = %program_id, "Subscribing to program accounts");
        let commitment = self.commitment;

        tokio::spawn(async move {
            let (mut notifications, unsubscribe) = match client
                .program_subscribe(
                    &program_id,
                    Some(RpcProgramAccountsConfig {
                        filters: Some(filters),
                        account_config: RpcAccountInfoConfig {
                            encoding: Some(UiAccountEncoding::Base64),
                            commitment: Some(commitment),
                            data_slice: None,
                            min_context_slot: None,
                        },
                        with_context: Some(true),
                        sort_results: None,
                    }),
                )
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!(feed = feed.name(), "Failed to subscribe to program {}: {}", program_id, e);
                    return;
                }
            };

            while let Some(response) = notifications.next().await {
                let Some((id, data)) = decode_keyed_account(&response.value) else {
                    warn!(feed = feed.name(), account = %response.value.pubkey, "Undecodable notification dropped");
                    continue;
                };
                if tx.send(feed.event(id, data)).is_err() {
                    warn!(feed = feed.name(), "Receiver dropped, unsubscribing");
                    break;
                }
            }
            unsubscribe().await;
            warn!(feed = feed.name(), "Subscription ended");
        });
    }

    fn subscribe_logs(
        &self,
        client: Arc<PubsubClient>,
        address: Pubkey,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) {
        info!(account = %address, "Subscribing to wallet transaction logs");
        let commitment = self.commitment;

        tokio::spawn(async move {
            let (mut notifications, unsubscribe) = match client
                .logs_subscribe(
                    RpcTransactionLogsFilter::Mentions(vec![address.to_string()]),
                    RpcTransactionLogsConfig {
                        commitment: Some(commitment),
                    },
                )
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!("Failed to subscribe to logs of {}: {}", address, e);
                    return;
                }
            };

            while let Some(response) = notifications.next().await {
                let event = StreamEvent::WalletTransaction {
                    signature: response.value.signature,
                    failed: response.value.err.is_some(),
                };
                if tx.send(event).is_err() {
                    debug!("Receiver dropped, unsubscribing from logs");
                    break;
                }
            }
            unsubscribe().await;
        });
    }
}
