//! Transaction submission
//!
//! Two [`Broadcaster`] implementations share the same assembly path (compute
//! budget, v0 message, sign):
//! - [`RpcBroadcaster`]: `send_and_confirm_transaction` through the RPC node
//! - [`JitoBroadcaster`]: appends a tip transfer and posts the transaction as
//!   a single-transaction bundle to a block engine, then polls the signature

use crate::config::ExecutionConfig;
use crate::errors::ExecutionError;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0::Message as MessageV0, VersionedMessage};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Block engine tip accounts
static JITO_TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
];

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Signs and submits a list of instructions as one transaction
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn submit(&self, instructions: Vec<Instruction>) -> Result<Signature, ExecutionError>;
}

/// Compute budget prefix for every swap transaction
pub fn compute_budget_instructions(cu_limit: u32, cu_price: u64) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2);
    if cu_limit > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(cu_limit));
    }
    if cu_price > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(cu_price));
    }
    instructions
}

/// Compile a v0 message and sign it with `payer`
pub fn sign_transaction(
    payer: &Keypair,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<VersionedTransaction, ExecutionError> {
    let message = MessageV0::try_compile(&payer.pubkey(), instructions, &[], recent_blockhash)
        .map_err(|e| ExecutionError::InstructionBuild(format!("Failed to compile message: {}", e)))?;
    VersionedTransaction::try_new(VersionedMessage::V0(message), &[payer])
        .map_err(|e| ExecutionError::Signing(e.to_string()))
}

/// Plain RPC submission
pub struct RpcBroadcaster {
    client: Arc<RpcClient>,
    payer: Arc<Keypair>,
    cu_limit: u32,
    cu_price: u64,
}

impl RpcBroadcaster {
    pub fn new(client: Arc<RpcClient>, payer: Arc<Keypair>, config: &ExecutionConfig) -> Self {
        Self {
            client,
            payer,
            cu_limit: config.compute_unit_limit,
            cu_price: config.compute_unit_price_micro_lamports,
        }
    }
}

#[async_trait]
impl Broadcaster for RpcBroadcaster {
    async fn submit(&self, instructions: Vec<Instruction>) -> Result<Signature, ExecutionError> {
        let mut all = compute_budget_instructions(self.cu_limit, self.cu_price);
        all.extend(instructions);

        let blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| ExecutionError::Broadcast(format!("blockhash: {}", e)))?;
        let tx = sign_transaction(&self.payer, &all, blockhash)?;

        let signature = self
            .client
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|e| ExecutionError::Broadcast(e.to_string()))?;
        debug!(%signature, "Transaction confirmed via RPC");
        Ok(signature)
    }
}

/// Bundled priority submission through a block engine
pub struct JitoBroadcaster {
    client: Arc<RpcClient>,
    http: Client,
    payer: Arc<Keypair>,
    block_engine_url: String,
    tip_lamports: u64,
    cu_limit: u32,
    cu_price: u64,
    confirm_timeout: Duration,
}

impl JitoBroadcaster {
    pub fn new(
        client: Arc<RpcClient>,
        payer: Arc<Keypair>,
        config: &ExecutionConfig,
    ) -> Result<Self, ExecutionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ExecutionError::Bundle(e.to_string()))?;
        Ok(Self {
            client,
            http,
            payer,
            block_engine_url: config.block_engine_url.clone(),
            tip_lamports: config.jito_tip_lamports,
            cu_limit: config.compute_unit_limit,
            cu_price: config.compute_unit_price_micro_lamports,
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
        })
    }

    fn random_tip_account() -> Pubkey {
        JITO_TIP_ACCOUNTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(JITO_TIP_ACCOUNTS[0])
    }

    async fn send_bundle(&self, tx: &VersionedTransaction) -> Result<String, ExecutionError> {
        let bytes = bincode::serialize(tx).map_err(|e| ExecutionError::Bundle(e.to_string()))?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [[bs58::encode(bytes).into_string()]]
        });

        let response = self
            .http
            .post(&self.block_engine_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Bundle(e.to_string()))?;
        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::Bundle(e.to_string()))?;

        if let Some(error) = value.get("error") {
            return Err(ExecutionError::Bundle(error.to_string()));
        }
        if !status.is_success() {
            return Err(ExecutionError::Bundle(format!("block engine returned {}", status)));
        }
        Ok(value
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<(), ExecutionError> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        while tokio::time::Instant::now() < deadline {
            match self.client.get_signature_statuses(&[*signature]).await {
                Ok(response) => {
                    if let Some(Some(status)) = response.value.first() {
                        if let Some(err) = &status.err {
                            return Err(ExecutionError::Broadcast(format!(
                                "transaction {} failed: {:?}",
                                signature, err
                            )));
                        }
                        if status.confirmation_status.is_some() {
                            return Ok(());
                        }
                    }
                }
                Err(e) => warn!(%signature, error = %e, "Signature status poll failed"),
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }
        Err(ExecutionError::Broadcast(format!(
            "bundle transaction {} not confirmed within {:?}",
            signature, self.confirm_timeout
        )))
    }
}

#[async_trait]
impl Broadcaster for JitoBroadcaster {
    async fn submit(&self, instructions: Vec<Instruction>) -> Result<Signature, ExecutionError> {
        let mut all = compute_budget_instructions(self.cu_limit, self.cu_price);
        all.extend(instructions);
        all.push(system_instruction::transfer(
            &self.payer.pubkey(),
            &Self::random_tip_account(),
            self.tip_lamports,
        ));

        let blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| ExecutionError::Broadcast(format!("blockhash: {}", e)))?;
        let tx = sign_transaction(&self.payer, &all, blockhash)?;
        let signature = tx.signatures[0];

        let bundle_id = self.send_bundle(&tx).await?;
        info!(%signature, bundle_id = %bundle_id, "Bundle submitted");
        self.await_confirmation(&signature).await?;
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_budget_prefix() {
        assert_eq!(compute_budget_instructions(200_000, 1_000).len(), 2);
        assert_eq!(compute_budget_instructions(0, 1_000).len(), 1);
        assert!(compute_budget_instructions(0, 0).is_empty());
    }

    #[test]
    fn test_sign_transaction() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let tx = sign_transaction(&payer, &[ix], Hash::default()).unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert!(tx.verify_with_results().iter().all(|ok| *ok));
    }

    #[test]
    fn test_tip_account_is_known() {
        let tip = JitoBroadcaster::random_tip_account();
        assert!(JITO_TIP_ACCOUNTS.contains(&tip));
    }
}
