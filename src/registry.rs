//! Token Account Registry
//!
//! Maps a base mint to what the wallet needs to trade it: the owned token
//! account, and once known the market record and the pool-key bundle.
//! Records are created on first sight of a mint (startup inventory, market
//! discovery or the buy path) and are never removed.

use crate::types::{MarketRecord, PoolKeys};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;

/// Per-mint trading metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountRecord {
    pub mint: Pubkey,
    /// Wallet's associated token account for `mint`
    pub address: Pubkey,
    pub pool_keys: Option<PoolKeys>,
    pub market: Option<MarketRecord>,
}

impl TokenAccountRecord {
    pub fn new(mint: Pubkey, address: Pubkey) -> Self {
        Self {
            mint,
            address,
            pool_keys: None,
            market: None,
        }
    }
}

/// Append-only mint -> record map shared by the stream handlers
#[derive(Debug, Default)]
pub struct TokenAccountRegistry {
    records: DashMap<Pubkey, TokenAccountRecord>,
}

impl TokenAccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mint: &Pubkey) -> Option<TokenAccountRecord> {
        self.records.get(mint).map(|r| r.clone())
    }

    /// Register the token account for `mint`
    ///
    /// The first address registered for a mint wins; returns false if the
    /// mint was already known.
    pub fn insert_account(&self, mint: Pubkey, address: Pubkey) -> bool {
        match self.records.entry(mint) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(TokenAccountRecord::new(mint, address));
                true
            }
        }
    }

    /// Attach market metadata, creating the record with `address` if needed
    pub fn save_market(&self, mint: Pubkey, address: Pubkey, market: MarketRecord) -> TokenAccountRecord {
        let mut entry = self
            .records
            .entry(mint)
            .or_insert_with(|| TokenAccountRecord::new(mint, address));
        entry.market = Some(market);
        entry.clone()
    }

    /// Attach the derived pool keys to an existing record
    pub fn set_pool_keys(&self, mint: &Pubkey, keys: PoolKeys) -> bool {
        match self.records.get_mut(mint) {
            Some(mut record) => {
                record.pool_keys = Some(keys);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.records.contains_key(mint)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> MarketRecord {
        MarketRecord {
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
        }
    }

    #[test]
    fn test_insert_account_keeps_first_address() {
        let registry = TokenAccountRegistry::new();
        let mint = Pubkey::new_unique();
        let first = Pubkey::new_unique();

        assert!(registry.insert_account(mint, first));
        assert!(!registry.insert_account(mint, Pubkey::new_unique()));
        assert_eq!(registry.get(&mint).unwrap().address, first);
    }

    #[test]
    fn test_save_market_creates_or_updates() {
        let registry = TokenAccountRegistry::new();
        let mint = Pubkey::new_unique();
        let address = Pubkey::new_unique();
        let m = market();

        let record = registry.save_market(mint, address, m);
        assert_eq!(record.market, Some(m));
        assert_eq!(record.address, address);

        // Existing address is preserved
        let m2 = market();
        let record = registry.save_market(mint, Pubkey::new_unique(), m2);
        assert_eq!(record.address, address);
        assert_eq!(record.market, Some(m2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_pool_keys_requires_record() {
        let registry = TokenAccountRegistry::new();
        let mint = Pubkey::new_unique();
        let keys = crate::types::PoolKeys {
            id: Pubkey::new_unique(),
            base_mint: mint,
            quote_mint: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            base_decimals: 6,
            quote_decimals: 9,
            program_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            open_orders: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            market_program_id: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            market_authority: Pubkey::new_unique(),
            market_base_vault: Pubkey::new_unique(),
            market_quote_vault: Pubkey::new_unique(),
            market_bids: Pubkey::new_unique(),
            market_asks: Pubkey::new_unique(),
            market_event_queue: Pubkey::new_unique(),
        };

        assert!(!registry.set_pool_keys(&mint, keys));
        registry.insert_account(mint, Pubkey::new_unique());
        assert!(registry.set_pool_keys(&mint, keys));
        assert_eq!(registry.get(&mint).unwrap().pool_keys, Some(keys));
    }
}
