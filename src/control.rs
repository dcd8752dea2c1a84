//! Operator control surface
//!
//! Commands reach the engine through an `mpsc` channel, so any front end can
//! drive them. The binary feeds it from stdin: `sell`, `reset`, `status`.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Exit the active position at the next tick boundary
    SellNow,
    /// Clear a faulted position gate
    ResetGate,
    /// Log a status summary
    Status,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "sell" | "s" => Some(ControlCommand::SellNow),
            "reset" => Some(ControlCommand::ResetGate),
            "status" => Some(ControlCommand::Status),
            _ => None,
        }
    }
}

/// Forward stdin lines as commands until stdin closes or the receiver is dropped
pub fn spawn_stdin_reader(tx: mpsc::Sender<ControlCommand>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match ControlCommand::parse(&line) {
                    Some(command) => {
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None => warn!(input = %line.trim(), "Unknown command (expected sell, reset or status)"),
                },
                Ok(None) => {
                    debug!("stdin closed, control reader stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(ControlCommand::parse("sell\n"), Some(ControlCommand::SellNow));
        assert_eq!(ControlCommand::parse(" S "), Some(ControlCommand::SellNow));
        assert_eq!(ControlCommand::parse("RESET"), Some(ControlCommand::ResetGate));
        assert_eq!(ControlCommand::parse("status"), Some(ControlCommand::Status));
        assert_eq!(ControlCommand::parse("buy"), None);
    }
}
