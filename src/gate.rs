//! Position Gate and entry admission policy
//!
//! The gate is the only place that decides whether a trade lifecycle may
//! start. Its state lives in a single `AtomicU8` so that two candidates
//! evaluated at the same instant cannot both enter:
//!
//! ```text
//!   Idle --try_enter--> InTrade --exit--> Idle
//!                          |
//!                        fault
//!                          v
//!                       Faulted --reset--> Idle
//! ```
//!
//! `Faulted` is entered after a failed buy or an incomplete final sell. It
//! refuses entries like `InTrade` does, but only an operator `reset` clears it.

use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, warn};

/// Gate state as observed from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    InTrade,
    Faulted,
}

impl GateState {
    const IDLE: u8 = 0;
    const IN_TRADE: u8 = 1;
    const FAULTED: u8 = 2;

    fn from_u8(raw: u8) -> Self {
        match raw {
            Self::IN_TRADE => GateState::InTrade,
            Self::FAULTED => GateState::Faulted,
            _ => GateState::Idle,
        }
    }

    /// Numeric encoding exported as a gauge
    pub fn as_gauge(self) -> i64 {
        match self {
            GateState::Idle => 0,
            GateState::InTrade => 1,
            GateState::Faulted => 2,
        }
    }
}

/// Single-active-trade gate
#[derive(Debug)]
pub struct PositionGate {
    state: AtomicU8,
}

impl Default for PositionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionGate {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(GateState::IDLE),
        }
    }

    /// Atomically move Idle -> InTrade; false if a trade is open or the gate is faulted
    pub fn try_enter(&self) -> bool {
        self.state
            .compare_exchange(
                GateState::IDLE,
                GateState::IN_TRADE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Return to Idle after a full exit. Idempotent.
    pub fn exit(&self) {
        self.state.store(GateState::IDLE, Ordering::Release);
    }

    /// Hold the gate closed until an operator reset
    pub fn fault(&self) {
        self.state.store(GateState::FAULTED, Ordering::Release);
    }

    /// Clear a fault. Returns false (and changes nothing) unless the gate was faulted.
    pub fn reset(&self) -> bool {
        self.state
            .compare_exchange(
                GateState::FAULTED,
                GateState::IDLE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn state(&self) -> GateState {
        GateState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.state() == GateState::Idle
    }
}

/// Static allow-list of mints, reloadable from disk
#[derive(Debug, Default)]
pub struct SnipeList {
    path: Option<PathBuf>,
    mints: RwLock<HashSet<Pubkey>>,
}

impl SnipeList {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            mints: RwLock::new(HashSet::new()),
        }
    }

    pub fn from_mints<I: IntoIterator<Item = Pubkey>>(mints: I) -> Self {
        Self {
            path: None,
            mints: RwLock::new(mints.into_iter().collect()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file, replacing the current list
    ///
    /// A missing or unreadable file leaves the previous list in place.
    pub async fn reload(&self) -> std::io::Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.len());
        };
        let content = tokio::fs::read_to_string(path).await?;
        let mints = parse_snipe_list(&content);
        let count = mints.len();
        *self.mints.write() = mints;
        debug!(path = %path.display(), count, "Snipe list reloaded");
        Ok(count)
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.mints.read().contains(mint)
    }

    pub fn len(&self) -> usize {
        self.mints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mints.read().is_empty()
    }
}

/// One mint per line; blank lines and unparseable entries are skipped
fn parse_snipe_list(content: &str) -> HashSet<Pubkey> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match Pubkey::from_str(line) {
            Ok(mint) => Some(mint),
            Err(_) => {
                warn!(entry = line, "Ignoring invalid snipe list entry");
                None
            }
        })
        .collect()
}

/// Pre-check applied before the filter chain
#[derive(Debug)]
pub enum EntryPolicy {
    /// Only mints on the allow-list; the gate is not consulted here
    SnipeList(SnipeList),
    /// Refuse candidates while the gate is not idle
    OneAtATime,
    /// Every candidate proceeds to the filters
    Unrestricted,
}

impl EntryPolicy {
    pub fn should_buy(&self, mint: &Pubkey, gate: &PositionGate) -> bool {
        match self {
            EntryPolicy::SnipeList(list) => list.contains(mint),
            EntryPolicy::OneAtATime => gate.is_idle(),
            EntryPolicy::Unrestricted => true,
        }
    }

    pub fn snipe_list(&self) -> Option<&SnipeList> {
        match self {
            EntryPolicy::SnipeList(list) => Some(list),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_gate_transitions() {
        let gate = PositionGate::new();
        assert_eq!(gate.state(), GateState::Idle);

        assert!(gate.try_enter());
        assert!(!gate.try_enter());
        assert_eq!(gate.state(), GateState::InTrade);

        gate.exit();
        gate.exit();
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_fault_requires_reset() {
        let gate = PositionGate::new();
        assert!(!gate.reset());

        assert!(gate.try_enter());
        gate.fault();
        assert!(!gate.try_enter());
        assert_eq!(gate.state(), GateState::Faulted);

        assert!(gate.reset());
        assert!(gate.try_enter());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_try_enter() {
        let gate = Arc::new(PositionGate::new());
        let entered = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let gate = gate.clone();
                let entered = entered.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    if gate.try_enter() {
                        entered.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_snipe_list() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let content = format!("{a}\n\n  {b}  \n# comment\nnot-a-key\n");
        let parsed = parse_snipe_list(&content);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains(&a) && parsed.contains(&b));
    }

    #[tokio::test]
    async fn test_snipe_list_reload() {
        let mint = Pubkey::new_unique();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{mint}").unwrap();

        let list = SnipeList::from_file(file.path());
        assert!(!list.contains(&mint));
        assert_eq!(list.reload().await.unwrap(), 1);
        assert!(list.contains(&mint));
    }

    #[test]
    fn test_entry_policy() {
        let gate = PositionGate::new();
        let listed = Pubkey::new_unique();
        let other = Pubkey::new_unique();

        let snipe = EntryPolicy::SnipeList(SnipeList::from_mints([listed]));
        assert!(snipe.should_buy(&listed, &gate));
        assert!(!snipe.should_buy(&other, &gate));

        assert!(EntryPolicy::OneAtATime.should_buy(&other, &gate));
        gate.try_enter();
        assert!(!EntryPolicy::OneAtATime.should_buy(&other, &gate));
        assert!(EntryPolicy::Unrestricted.should_buy(&other, &gate));
        // Snipe list ignores the gate
        assert!(snipe.should_buy(&listed, &gate));
    }
}
