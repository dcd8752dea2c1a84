//! Structured logging and pipeline context
//!
//! Every detected pool gets a [`PipelineContext`]; the buy, the monitor and
//! the sells of the resulting trade log through child contexts so one
//! correlation id ties the whole lifecycle together.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use uuid::Uuid;

/// Structured logger for pipeline events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn log_pool_detected(&self, pool: &Pubkey, mint: &Pubkey, link: &str) {
        tracing::info!(
            context_id = %self.context_id,
            pool = %pool,
            mint = %mint,
            link = %link,
            "🆕 New pool detected"
        );
    }

    pub fn log_filter_rejected(&self, mint: &Pubkey, filter: &str, reason: &str) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            filter = %filter,
            reason = %reason,
            "Candidate rejected"
        );
    }

    pub fn log_buy_attempt(&self, mint: &Pubkey, amount: u64) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            amount = %amount,
            "Attempting buy transaction"
        );
    }

    pub fn log_buy_success(&self, mint: &Pubkey, sig: &Signature, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            signature = %sig,
            latency_ms = %latency_ms,
            "✅ Buy transaction successful"
        );
    }

    pub fn log_buy_failure(&self, mint: &Pubkey, error: &str, latency_ms: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            mint = %mint,
            error = %error,
            latency_ms = %latency_ms,
            "Buy transaction failed"
        );
    }

    pub fn log_sell_operation(&self, mint: &Pubkey, amount: u64, is_final: bool, sig: &Signature) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            amount = %amount,
            is_final = %is_final,
            signature = %sig,
            "Sell operation"
        );
    }

    pub fn log_exit(&self, mint: &Pubkey, kind: &str, pnl_percent: f64) {
        tracing::info!(
            context_id = %self.context_id,
            mint = %mint,
            kind = %kind,
            pnl_percent = %format!("{:.2}", pnl_percent),
            "Exit triggered"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            message = %message,
            "Warning"
        );
    }

    pub fn error(&self, message: &str) {
        tracing::error!(
            context_id = %self.context_id,
            message = %message,
            "Error"
        );
    }
}

/// Pipeline execution context for one trade lifecycle
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Span ID
    pub span_id: String,

    /// Parent span ID (if any)
    pub parent_span_id: Option<String>,

    /// Operation name
    pub operation: String,

    /// Timestamp
    pub timestamp: u64,

    /// Shared by every context derived from the same detection
    pub correlation_id: String,

    /// Structured logger instance
    pub logger: StructuredLogger,
}

impl PipelineContext {
    /// Create a new pipeline context
    pub fn new(operation: &str) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        Self {
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: None,
            operation: operation.to_string(),
            timestamp: crate::types::unix_timestamp(),
            logger: StructuredLogger::new(correlation_id.clone()),
            correlation_id,
        }
    }

    /// Create a child context
    pub fn child(&self, operation: &str) -> Self {
        Self {
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: Some(self.span_id.clone()),
            operation: operation.to_string(),
            timestamp: crate::types::unix_timestamp(),
            correlation_id: self.correlation_id.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shares_correlation_id() {
        let root = PipelineContext::new("pool");
        let child = root.child("sell");
        assert_eq!(child.correlation_id, root.correlation_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
        assert_ne!(child.span_id, root.span_id);
    }
}
