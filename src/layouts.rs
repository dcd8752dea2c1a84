//! Binary account layouts consumed by the pipeline
//!
//! Only the fields the sniper reads are decoded. Every decoder checks the
//! payload length first and returns [`DecodeError`] instead of panicking, so a
//! malformed notification can be logged and dropped by the caller.
//!
//! The `encode` helpers write the same fields back at the same offsets. They
//! are used by the subscription tests and by anyone replaying captured data.

use crate::errors::DecodeError;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;
use spl_token::solana_program::program_pack::Pack;

/// Raydium AMM v4 pool state (`LIQUIDITY_STATE_LAYOUT_V4`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityStateV4 {
    pub status: u64,
    pub base_decimal: u64,
    pub quote_decimal: u64,
    pub pool_open_time: u64,
    pub swap_quote_in_amount: u128,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
    pub owner: Pubkey,
    pub lp_reserve: u64,
}

impl LiquidityStateV4 {
    pub const SPAN: usize = 752;

    pub const STATUS_OFFSET: usize = 0;
    const BASE_DECIMAL_OFFSET: usize = 32;
    const QUOTE_DECIMAL_OFFSET: usize = 40;
    const POOL_OPEN_TIME_OFFSET: usize = 224;
    const SWAP_QUOTE_IN_AMOUNT_OFFSET: usize = 296;
    const BASE_VAULT_OFFSET: usize = 336;
    const QUOTE_VAULT_OFFSET: usize = 368;
    const BASE_MINT_OFFSET: usize = 400;
    pub const QUOTE_MINT_OFFSET: usize = 432;
    const LP_MINT_OFFSET: usize = 464;
    const OPEN_ORDERS_OFFSET: usize = 496;
    const MARKET_ID_OFFSET: usize = 528;
    pub const MARKET_PROGRAM_ID_OFFSET: usize = 560;
    const TARGET_ORDERS_OFFSET: usize = 592;
    const WITHDRAW_QUEUE_OFFSET: usize = 624;
    const LP_VAULT_OFFSET: usize = 656;
    const OWNER_OFFSET: usize = 688;
    const LP_RESERVE_OFFSET: usize = 720;

    /// Status value of a pool that is live for swapping
    pub const STATUS_SWAP_ONLY: u64 = 6;

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len(data, Self::SPAN)?;
        Ok(Self {
            status: read_u64(data, Self::STATUS_OFFSET),
            base_decimal: read_u64(data, Self::BASE_DECIMAL_OFFSET),
            quote_decimal: read_u64(data, Self::QUOTE_DECIMAL_OFFSET),
            pool_open_time: read_u64(data, Self::POOL_OPEN_TIME_OFFSET),
            swap_quote_in_amount: read_u128(data, Self::SWAP_QUOTE_IN_AMOUNT_OFFSET),
            base_vault: read_pubkey(data, Self::BASE_VAULT_OFFSET),
            quote_vault: read_pubkey(data, Self::QUOTE_VAULT_OFFSET),
            base_mint: read_pubkey(data, Self::BASE_MINT_OFFSET),
            quote_mint: read_pubkey(data, Self::QUOTE_MINT_OFFSET),
            lp_mint: read_pubkey(data, Self::LP_MINT_OFFSET),
            open_orders: read_pubkey(data, Self::OPEN_ORDERS_OFFSET),
            market_id: read_pubkey(data, Self::MARKET_ID_OFFSET),
            market_program_id: read_pubkey(data, Self::MARKET_PROGRAM_ID_OFFSET),
            target_orders: read_pubkey(data, Self::TARGET_ORDERS_OFFSET),
            withdraw_queue: read_pubkey(data, Self::WITHDRAW_QUEUE_OFFSET),
            lp_vault: read_pubkey(data, Self::LP_VAULT_OFFSET),
            owner: read_pubkey(data, Self::OWNER_OFFSET),
            lp_reserve: read_u64(data, Self::LP_RESERVE_OFFSET),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::SPAN];
        write_u64(&mut data, Self::STATUS_OFFSET, self.status);
        write_u64(&mut data, Self::BASE_DECIMAL_OFFSET, self.base_decimal);
        write_u64(&mut data, Self::QUOTE_DECIMAL_OFFSET, self.quote_decimal);
        write_u64(&mut data, Self::POOL_OPEN_TIME_OFFSET, self.pool_open_time);
        data[Self::SWAP_QUOTE_IN_AMOUNT_OFFSET..Self::SWAP_QUOTE_IN_AMOUNT_OFFSET + 16]
            .copy_from_slice(&self.swap_quote_in_amount.to_le_bytes());
        write_pubkey(&mut data, Self::BASE_VAULT_OFFSET, &self.base_vault);
        write_pubkey(&mut data, Self::QUOTE_VAULT_OFFSET, &self.quote_vault);
        write_pubkey(&mut data, Self::BASE_MINT_OFFSET, &self.base_mint);
        write_pubkey(&mut data, Self::QUOTE_MINT_OFFSET, &self.quote_mint);
        write_pubkey(&mut data, Self::LP_MINT_OFFSET, &self.lp_mint);
        write_pubkey(&mut data, Self::OPEN_ORDERS_OFFSET, &self.open_orders);
        write_pubkey(&mut data, Self::MARKET_ID_OFFSET, &self.market_id);
        write_pubkey(&mut data, Self::MARKET_PROGRAM_ID_OFFSET, &self.market_program_id);
        write_pubkey(&mut data, Self::TARGET_ORDERS_OFFSET, &self.target_orders);
        write_pubkey(&mut data, Self::WITHDRAW_QUEUE_OFFSET, &self.withdraw_queue);
        write_pubkey(&mut data, Self::LP_VAULT_OFFSET, &self.lp_vault);
        write_pubkey(&mut data, Self::OWNER_OFFSET, &self.owner);
        write_u64(&mut data, Self::LP_RESERVE_OFFSET, self.lp_reserve);
        data
    }
}

/// The three OpenBook v3 market fields a swap needs (`MARKET_STATE_LAYOUT_V3`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimalMarketV3 {
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
}

impl MinimalMarketV3 {
    pub const SPAN: usize = 388;

    pub const BASE_MINT_OFFSET: usize = 53;
    pub const QUOTE_MINT_OFFSET: usize = 85;
    const EVENT_QUEUE_OFFSET: usize = 253;
    const BIDS_OFFSET: usize = 285;
    const ASKS_OFFSET: usize = 317;

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len(data, Self::SPAN)?;
        Ok(Self {
            event_queue: read_pubkey(data, Self::EVENT_QUEUE_OFFSET),
            bids: read_pubkey(data, Self::BIDS_OFFSET),
            asks: read_pubkey(data, Self::ASKS_OFFSET),
        })
    }

    /// Base mint of a full market account
    pub fn decode_base_mint(data: &[u8]) -> Result<Pubkey, DecodeError> {
        ensure_len(data, Self::SPAN)?;
        Ok(read_pubkey(data, Self::BASE_MINT_OFFSET))
    }

    pub fn encode(&self, base_mint: &Pubkey, quote_mint: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; Self::SPAN];
        write_pubkey(&mut data, Self::BASE_MINT_OFFSET, base_mint);
        write_pubkey(&mut data, Self::QUOTE_MINT_OFFSET, quote_mint);
        write_pubkey(&mut data, Self::EVENT_QUEUE_OFFSET, &self.event_queue);
        write_pubkey(&mut data, Self::BIDS_OFFSET, &self.bids);
        write_pubkey(&mut data, Self::ASKS_OFFSET, &self.asks);
        data
    }
}

/// SPL token account fields used for wallet tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

impl TokenAccountInfo {
    pub const SPAN: usize = spl_token::state::Account::LEN;
    pub const OWNER_OFFSET: usize = 32;

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len(data, Self::SPAN)?;
        let account = spl_token::state::Account::unpack(&data[..Self::SPAN])
            .map_err(|_| DecodeError::InvalidField("token_account"))?;
        Ok(Self {
            mint: Pubkey::new_from_array(account.mint.to_bytes()),
            owner: Pubkey::new_from_array(account.owner.to_bytes()),
            amount: account.amount,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::SPAN];
        write_pubkey(&mut data, 0, &self.mint);
        write_pubkey(&mut data, Self::OWNER_OFFSET, &self.owner);
        write_u64(&mut data, 64, self.amount);
        // AccountState::Initialized
        data[108] = 1;
        data
    }
}

/// SPL mint fields used by the safety filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
}

impl MintInfo {
    pub const SPAN: usize = spl_token::state::Mint::LEN;

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        ensure_len(data, Self::SPAN)?;
        let mint = spl_token::state::Mint::unpack(&data[..Self::SPAN])
            .map_err(|_| DecodeError::InvalidField("mint"))?;
        let mint_authority: Option<spl_token::solana_program::pubkey::Pubkey> =
            mint.mint_authority.into();
        Ok(Self {
            mint_authority: mint_authority.map(|a| Pubkey::new_from_array(a.to_bytes())),
            supply: mint.supply,
            decimals: mint.decimals,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; Self::SPAN];
        if let Some(authority) = &self.mint_authority {
            data[0..4].copy_from_slice(&1u32.to_le_bytes());
            write_pubkey(&mut data, 4, authority);
        }
        write_u64(&mut data, 36, self.supply);
        data[44] = self.decimals;
        data[45] = 1;
        data
    }
}

/// Metaplex token metadata, reduced to the mutability flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub is_mutable: bool,
}

/// Leading fields of a Metaplex metadata account (v1 layout)
///
/// Accounts carry more fields after `is_mutable`; they are left unread.
#[derive(BorshDeserialize, BorshSerialize, Debug)]
struct MetadataPrefix {
    key: u8,
    update_authority: [u8; 32],
    mint: [u8; 32],
    data: MetadataData,
    primary_sale_happened: bool,
    is_mutable: bool,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
struct MetadataData {
    name: String,
    symbol: String,
    uri: String,
    seller_fee_basis_points: u16,
    creators: Option<Vec<Creator>>,
}

#[derive(BorshDeserialize, BorshSerialize, Debug)]
struct Creator {
    address: [u8; 32],
    verified: bool,
    share: u8,
}

/// `Key::MetadataV1`
const METADATA_V1_KEY: u8 = 4;

impl TokenMetadata {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let prefix = MetadataPrefix::deserialize(&mut &data[..])
            .map_err(|_| DecodeError::InvalidField("metadata"))?;
        if prefix.key != METADATA_V1_KEY {
            return Err(DecodeError::InvalidField("metadata key"));
        }
        let trim = |s: String| s.trim_end_matches('\0').to_string();
        Ok(Self {
            name: trim(prefix.data.name),
            symbol: trim(prefix.data.symbol),
            uri: trim(prefix.data.uri),
            is_mutable: prefix.is_mutable,
        })
    }

    pub fn encode(&self, mint: &Pubkey) -> Vec<u8> {
        let prefix = MetadataPrefix {
            key: METADATA_V1_KEY,
            update_authority: [0u8; 32],
            mint: mint.to_bytes(),
            data: MetadataData {
                name: self.name.clone(),
                symbol: self.symbol.clone(),
                uri: self.uri.clone(),
                seller_fee_basis_points: 0,
                creators: None,
            },
            primary_sale_happened: false,
            is_mutable: self.is_mutable,
        };
        borsh::to_vec(&prefix).unwrap_or_default()
    }
}

#[inline]
fn ensure_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::TooSmall {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

#[inline]
fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn read_u128(data: &[u8], offset: usize) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&data[offset..offset + 16]);
    u128::from_le_bytes(buf)
}

#[inline]
fn read_pubkey(data: &[u8], offset: usize) -> Pubkey {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&data[offset..offset + 32]);
    Pubkey::new_from_array(buf)
}

fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_pubkey(data: &mut [u8], offset: usize, key: &Pubkey) {
    data[offset..offset + 32].copy_from_slice(key.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> LiquidityStateV4 {
        LiquidityStateV4 {
            status: LiquidityStateV4::STATUS_SWAP_ONLY,
            base_decimal: 6,
            quote_decimal: 9,
            pool_open_time: 1_700_000_000,
            swap_quote_in_amount: 42,
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            open_orders: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            market_program_id: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            withdraw_queue: Pubkey::new_unique(),
            lp_vault: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            lp_reserve: 1_000,
        }
    }

    #[test]
    fn test_liquidity_state_offsets() {
        let state = sample_state();
        let data = state.encode();
        assert_eq!(data.len(), LiquidityStateV4::SPAN);
        assert_eq!(
            &data[LiquidityStateV4::QUOTE_MINT_OFFSET..LiquidityStateV4::QUOTE_MINT_OFFSET + 32],
            state.quote_mint.as_ref()
        );
        assert_eq!(LiquidityStateV4::decode(&data).unwrap(), state);
    }

    #[test]
    fn test_liquidity_state_too_small() {
        let err = LiquidityStateV4::decode(&[0u8; 100]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooSmall {
                expected: 752,
                actual: 100
            }
        );
    }

    #[test]
    fn test_market_decode() {
        let market = MinimalMarketV3 {
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
        };
        let base = Pubkey::new_unique();
        let data = market.encode(&base, &Pubkey::new_unique());
        assert_eq!(MinimalMarketV3::decode(&data).unwrap(), market);
        assert_eq!(MinimalMarketV3::decode_base_mint(&data).unwrap(), base);
    }

    #[test]
    fn test_token_account_decode() {
        let info = TokenAccountInfo {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 123_456,
        };
        assert_eq!(TokenAccountInfo::decode(&info.encode()).unwrap(), info);
    }

    #[test]
    fn test_token_account_uninitialized_rejected() {
        let data = vec![0u8; TokenAccountInfo::SPAN];
        assert!(TokenAccountInfo::decode(&data).is_err());
    }

    #[test]
    fn test_mint_authority_option() {
        let renounced = MintInfo {
            mint_authority: None,
            supply: 1_000,
            decimals: 6,
        };
        assert_eq!(MintInfo::decode(&renounced.encode()).unwrap(), renounced);

        let owned = MintInfo {
            mint_authority: Some(Pubkey::new_unique()),
            ..renounced
        };
        assert_eq!(MintInfo::decode(&owned.encode()).unwrap(), owned);
    }

    #[test]
    fn test_metadata_mutability() {
        let mint = Pubkey::new_unique();
        let meta = TokenMetadata {
            name: "Test".to_string(),
            symbol: "TST".to_string(),
            uri: "https://example.com/t.json".to_string(),
            is_mutable: false,
        };
        let decoded = TokenMetadata::decode(&meta.encode(&mint)).unwrap();
        assert!(!decoded.is_mutable);
        assert_eq!(decoded.symbol, "TST");

        let truncated = &meta.encode(&mint)[..70];
        assert!(TokenMetadata::decode(truncated).is_err());
    }

    #[test]
    fn test_metadata_with_creators_and_padding() {
        let prefix = MetadataPrefix {
            key: METADATA_V1_KEY,
            update_authority: Pubkey::new_unique().to_bytes(),
            mint: Pubkey::new_unique().to_bytes(),
            data: MetadataData {
                name: "Pad\0\0\0".to_string(),
                symbol: "PAD".to_string(),
                uri: String::new(),
                seller_fee_basis_points: 500,
                creators: Some(vec![
                    Creator { address: [1u8; 32], verified: true, share: 60 },
                    Creator { address: [2u8; 32], verified: false, share: 40 },
                ]),
            },
            primary_sale_happened: true,
            is_mutable: true,
        };
        let mut data = borsh::to_vec(&prefix).unwrap();
        // Edition nonce, token standard and collection fields follow on chain
        data.extend_from_slice(&[0u8; 200]);

        let decoded = TokenMetadata::decode(&data).unwrap();
        assert!(decoded.is_mutable);
        assert_eq!(decoded.name, "Pad");

        data[0] = 1;
        assert!(TokenMetadata::decode(&data).is_err());
    }
}
