//! Wallet management module

use crate::config::WalletConfig;
use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;

/// Owner of the trading keypair
#[derive(Clone)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Base58 secret (PRIVATE_KEY) first, then the keypair file
    pub fn from_config(config: &WalletConfig) -> Result<Self> {
        if let Some(secret) = config.private_key.as_deref() {
            return Self::from_base58(secret);
        }
        match config.keypair_path.as_deref() {
            Some(path) => Self::from_file(path),
            None => Err(crate::errors::ConfigError::MissingWallet.into()),
        }
    }

    /// Create a new wallet manager from a keypair file
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;

        let bytes = if keypair_bytes.len() == 64 {
            keypair_bytes
        } else {
            // JSON format
            serde_json::from_slice::<Vec<u8>>(&keypair_bytes)
                .context("Failed to parse keypair JSON")?
        };
        Self::from_bytes(&bytes)
    }

    /// Create a wallet from a base58-encoded 64-byte secret key
    pub fn from_base58(secret: &str) -> Result<Self> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .context("PRIVATE_KEY is not valid base58")?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", bytes.len());
        }
        if bytes.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }
        let keypair = Keypair::try_from(bytes).context("Invalid keypair bytes")?;
        Ok(Self::from_keypair(keypair))
    }

    /// Create a new wallet manager from a keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Get an Arc reference to the keypair (for use with libraries expecting Arc<Keypair>)
    pub fn keypair_arc(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }

    /// Associated token account of this wallet for `mint`
    pub fn token_account(&self, mint: &Pubkey) -> Pubkey {
        get_associated_token_address(&self.pubkey(), mint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_base58_roundtrip() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let wallet = WalletManager::from_base58(&encoded).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_from_json_file() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap()).unwrap();

        let wallet = WalletManager::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_rejects_bad_keys() {
        assert!(WalletManager::from_base58("not base58 0OIl").is_err());
        let zeros = bs58::encode([0u8; 64]).into_string();
        assert!(WalletManager::from_base58(&zeros).is_err());
        assert!(WalletManager::from_config(&WalletConfig::default()).is_err());
    }

    #[test]
    fn test_private_key_takes_precedence() {
        let keypair = Keypair::new();
        let config = WalletConfig {
            keypair_path: Some("/nonexistent/id.json".to_string()),
            private_key: Some(bs58::encode(keypair.to_bytes()).into_string()),
        };
        assert_eq!(WalletManager::from_config(&config).unwrap().pubkey(), keypair.pubkey());
    }
}
