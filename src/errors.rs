//! Error taxonomy for the sniper
//!
//! Errors are split by how the pipeline reacts to them:
//! - [`ConfigError`]: fatal at startup, the process must not proceed
//! - [`DecodeError`]: malformed notification payloads, logged and dropped
//! - [`LookupError`]: transient external reads, turned into rejections/skipped ticks
//! - [`ExecutionError`]: swap build or submission failures
//! - [`SellError`]: a final sell that could not drain the position

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Configuration errors (fatal at startup)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Quote currency other than WSOL/USDC
    #[error("Unsupported quote mint \"{0}\". Supported values are USDC and WSOL")]
    UnsupportedQuoteMint(String),

    /// Commitment level that the RPC layer does not know
    #[error("Unknown commitment level \"{0}\"")]
    UnknownCommitment(String),

    /// Numeric option outside its accepted range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Option name as it appears in the config file
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Environment override that could not be parsed
    #[error("Invalid environment override {name}={value}")]
    InvalidEnv {
        name: &'static str,
        value: String,
    },

    /// Neither a keypair file nor a private key was provided
    #[error("No wallet configured: set wallet.keypair_path or PRIVATE_KEY")]
    MissingWallet,

    /// File could not be read or parsed
    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Decoding errors for raw account payloads
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload shorter than the layout span
    #[error("Account data too small: expected {expected} bytes, got {actual}")]
    TooSmall { expected: usize, actual: usize },

    /// Field decoded but holds an impossible value
    #[error("Invalid field {0}")]
    InvalidField(&'static str),

    /// No program address could be derived for the market authority
    #[error("Could not derive market authority for {0}")]
    MarketAuthority(Pubkey),
}

/// Failures of external reads (RPC, HTTP)
#[derive(Error, Debug, Clone)]
pub enum LookupError {
    /// Transport-level failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// HTTP API failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Account the lookup depends on does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    /// Account exists but its payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Local rate limiter refused the call
    #[error("Rate limited")]
    RateLimited,
}

/// Swap construction and submission failures
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// Dependency lookup failed before a transaction could be built
    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// Instruction construction failed
    #[error("Instruction build error: {0}")]
    InstructionBuild(String),

    /// Signing failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Transaction was rejected or never confirmed
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// Bundle endpoint refused the bundle
    #[error("Bundle rejected: {0}")]
    Bundle(String),
}

/// Final sell could not bring the balance to zero
#[derive(Error, Debug, Clone)]
pub enum SellError {
    #[error("Sell of {mint} incomplete after {attempts} attempts, {remaining} tokens left (last error: {last_error:?})")]
    Exhausted {
        mint: Pubkey,
        attempts: u32,
        remaining: u64,
        last_error: Option<String>,
    },

    /// Partial sell failed on every attempt
    #[error("Partial sell of {mint} failed after {attempts} attempts: {source}")]
    PartialFailed {
        mint: Pubkey,
        attempts: u32,
        #[source]
        source: ExecutionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::UnsupportedQuoteMint("BONK".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported quote mint \"BONK\". Supported values are USDC and WSOL"
        );

        let err = ConfigError::invalid("exit.stop_loss_percent", "must be in (0, 100)");
        assert!(err.to_string().contains("exit.stop_loss_percent"));
    }

    #[test]
    fn test_lookup_error_from_decode() {
        let err: LookupError = DecodeError::TooSmall {
            expected: 82,
            actual: 3,
        }
        .into();
        assert!(matches!(err, LookupError::Decode(_)));
    }

    #[test]
    fn test_execution_error_from_lookup() {
        let mint = Pubkey::new_unique();
        let err: ExecutionError = LookupError::AccountNotFound(mint).into();
        assert!(err.to_string().contains(&mint.to_string()));
    }
}
