//! Dedup Ledger - first-seen admission of pool and market identifiers
//!
//! The subscription feed re-delivers the same account every time it changes,
//! and websocket reconnects replay recent notifications. The ledger makes sure
//! each identifier enters the pipeline exactly once per process lifetime.
//!
//! ## Key Features
//!
//! - **Exactly-once admission**: concurrent callers racing on the same id
//!   resolve to a single winner (`DashSet::insert` is atomic per shard)
//! - **No eviction**: entries live for the whole run
//!
//! ## Usage Example
//!
//! ```
//! use sniper::dedup::DedupLedger;
//! use solana_sdk::pubkey::Pubkey;
//!
//! let pools = DedupLedger::new("pools");
//! let id = Pubkey::new_unique();
//! assert!(pools.admit(id));
//! assert!(!pools.admit(id));
//! ```

use dashmap::DashSet;
use solana_sdk::pubkey::Pubkey;
use std::hash::Hash;

/// Set of identifiers already seen on one subscription
#[derive(Debug)]
pub struct DedupLedger<K = Pubkey>
where
    K: Eq + Hash,
{
    scope: &'static str,
    seen: DashSet<K>,
}

impl<K> DedupLedger<K>
where
    K: Eq + Hash,
{
    /// Create an empty ledger; `scope` names it in logs and metrics
    pub fn new(scope: &'static str) -> Self {
        Self {
            scope,
            seen: DashSet::new(),
        }
    }

    /// Record `id`, returning true only the first time it is seen
    pub fn admit(&self, id: K) -> bool {
        self.seen.insert(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }
}
