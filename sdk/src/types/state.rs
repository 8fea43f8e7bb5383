//! Persisted market state layout.
//!
//! Every account owned by the exchange program is framed by a 5-byte head
//! and a 7-byte tail, which together make up the 12-byte header overhead.
//! The account flags word follows the head.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use super::market::{MarketAccounts, MarketParameters};
use super::role::MarketRole;
use crate::error::SdkError;

/// Leading frame bytes of every exchange account.
pub const HEAD_PADDING: &[u8; 5] = b"serum";

/// Trailing frame bytes of every exchange account.
pub const TAIL_PADDING: &[u8; 7] = b"padding";

/// Account flag bits written by the exchange program.
pub mod account_flag {
    /// Account has been initialized.
    pub const INITIALIZED: u64 = 1 << 0;
    /// Market header account.
    pub const MARKET: u64 = 1 << 1;
    /// Event queue account.
    pub const EVENT_QUEUE: u64 = 1 << 2;
    /// Request queue account.
    pub const REQUEST_QUEUE: u64 = 1 << 3;
    /// Bids account.
    pub const BIDS: u64 = 1 << 5;
    /// Asks account.
    pub const ASKS: u64 = 1 << 6;
}

/// Returns the flags an initialized account of `role` carries.
#[must_use]
pub const fn flags_for(role: MarketRole) -> u64 {
    let kind = match role {
        MarketRole::MarketState => account_flag::MARKET,
        MarketRole::EventQueue => account_flag::EVENT_QUEUE,
        MarketRole::RequestQueue => account_flag::REQUEST_QUEUE,
        MarketRole::Bids => account_flag::BIDS,
        MarketRole::Asks => account_flag::ASKS,
    };
    account_flag::INITIALIZED | kind
}

/// Returns true if every byte of the account is zero.
#[must_use]
pub fn is_zeroed(data: &[u8]) -> bool {
    data.iter().all(|b| *b == 0)
}

/// Reads the account flags word.
///
/// Returns 0 for a zeroed account.
///
/// # Errors
///
/// Returns an error if the account is too short or the frame is corrupt.
pub fn read_flags(data: &[u8]) -> Result<u64, SdkError> {
    if is_zeroed(data) {
        return Ok(0);
    }

    let (body, _) = framed_body(data)?;
    let word = body
        .get(..8)
        .ok_or_else(|| SdkError::Deserialization("account too short for flags".to_string()))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(word);
    Ok(u64::from_le_bytes(bytes))
}

/// Frames a zeroed account and writes the flags for `role`.
///
/// # Errors
///
/// Returns an error if the account is too short.
pub fn write_flags(data: &mut [u8], role: MarketRole) -> Result<(), SdkError> {
    write_body(data, &flags_for(role).to_le_bytes())
}

fn framed_body(data: &[u8]) -> Result<(&[u8], usize), SdkError> {
    let head = HEAD_PADDING.len();
    let tail = TAIL_PADDING.len();

    if data.len() < head + tail {
        return Err(SdkError::Deserialization("account smaller than frame".to_string()));
    }
    if data.get(..head) != Some(HEAD_PADDING.as_slice())
        || data.get(data.len() - tail..) != Some(TAIL_PADDING.as_slice())
    {
        return Err(SdkError::Deserialization("corrupt account frame".to_string()));
    }

    let body = data
        .get(head..data.len() - tail)
        .ok_or_else(|| SdkError::Deserialization("corrupt account frame".to_string()))?;
    Ok((body, head))
}

fn write_body(data: &mut [u8], body: &[u8]) -> Result<(), SdkError> {
    let head = HEAD_PADDING.len();
    let tail = TAIL_PADDING.len();
    let len = data.len();

    if len < head + tail + body.len() {
        return Err(SdkError::Serialization(format!(
            "account of {} bytes cannot hold {} byte body",
            len,
            body.len()
        )));
    }

    let (front, rest) = data.split_at_mut(head);
    front.copy_from_slice(HEAD_PADDING);
    let (middle, back) = rest.split_at_mut(len - head - tail);
    let (payload, _) = middle.split_at_mut(body.len());
    payload.copy_from_slice(body);
    back.copy_from_slice(TAIL_PADDING);
    Ok(())
}

/// Market header written by the initialize instruction.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct MarketStateRecord {
    /// Account flags.
    pub account_flags: u64,
    /// Address of the market header account itself.
    pub own_address: [u8; 32],
    /// Nonce of the vault signer.
    pub vault_signer_nonce: u64,
    /// Base asset mint.
    pub coin_mint: [u8; 32],
    /// Quote asset mint.
    pub price_mint: [u8; 32],
    /// Base asset wallet.
    pub coin_wallet: [u8; 32],
    /// Quote asset wallet.
    pub price_wallet: [u8; 32],
    /// Request queue.
    pub request_queue: [u8; 32],
    /// Event queue.
    pub event_queue: [u8; 32],
    /// Bids.
    pub bids: [u8; 32],
    /// Asks.
    pub asks: [u8; 32],
    /// Base asset atoms per lot.
    pub coin_lot_size: u64,
    /// Quote asset atoms per lot.
    pub pc_lot_size: u64,
    /// Dust threshold.
    pub pc_dust_threshold: u64,
}

impl MarketStateRecord {
    /// Builds the record for an initialized market.
    #[must_use]
    pub fn new(params: &MarketParameters, accounts: &MarketAccounts, vault_signer_nonce: u64) -> Self {
        Self {
            account_flags: flags_for(MarketRole::MarketState),
            own_address: accounts.market_state.to_bytes(),
            vault_signer_nonce,
            coin_mint: params.coin_mint.to_bytes(),
            price_mint: params.price_mint.to_bytes(),
            coin_wallet: accounts.coin_wallet.to_bytes(),
            price_wallet: accounts.price_wallet.to_bytes(),
            request_queue: accounts.request_queue.to_bytes(),
            event_queue: accounts.event_queue.to_bytes(),
            bids: accounts.bids.to_bytes(),
            asks: accounts.asks.to_bytes(),
            coin_lot_size: params.coin_lot_size,
            pc_lot_size: params.pc_lot_size,
            pc_dust_threshold: params.pc_dust_threshold,
        }
    }

    /// Writes the record into a market header account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account is too small.
    pub fn pack(&self, data: &mut [u8]) -> Result<(), SdkError> {
        let body = borsh::to_vec(self).map_err(|e| SdkError::Serialization(e.to_string()))?;
        write_body(data, &body)
    }

    /// Reads the record from a market header account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account is zeroed, corrupt or not a market.
    pub fn unpack(data: &[u8]) -> Result<Self, SdkError> {
        let (body, _) = framed_body(data)?;
        let mut cursor = body;
        let record = Self::deserialize(&mut cursor)
            .map_err(|e| SdkError::Deserialization(e.to_string()))?;

        if record.account_flags != flags_for(MarketRole::MarketState) {
            return Err(SdkError::Deserialization(format!(
                "unexpected market flags {:#x}",
                record.account_flags
            )));
        }
        Ok(record)
    }

    /// Returns the market parameters stored in the record.
    #[must_use]
    pub fn params(&self) -> MarketParameters {
        MarketParameters {
            coin_mint: Pubkey::new_from_array(self.coin_mint),
            price_mint: Pubkey::new_from_array(self.price_mint),
            coin_lot_size: self.coin_lot_size,
            pc_lot_size: self.pc_lot_size,
            pc_dust_threshold: self.pc_dust_threshold,
        }
    }

    /// Returns the account bundle stored in the record.
    #[must_use]
    pub fn accounts(&self) -> MarketAccounts {
        MarketAccounts {
            market_state: Pubkey::new_from_array(self.own_address),
            request_queue: Pubkey::new_from_array(self.request_queue),
            event_queue: Pubkey::new_from_array(self.event_queue),
            bids: Pubkey::new_from_array(self.bids),
            asks: Pubkey::new_from_array(self.asks),
            coin_wallet: Pubkey::new_from_array(self.coin_wallet),
            price_wallet: Pubkey::new_from_array(self.price_wallet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::MarketCapacity;

    fn sample() -> (MarketParameters, MarketAccounts) {
        let params = MarketParameters::new(Pubkey::new_unique(), Pubkey::new_unique())
            .with_lot_sizes(10, 10)
            .with_dust_threshold(1);
        let accounts = MarketAccounts {
            market_state: Pubkey::new_unique(),
            request_queue: Pubkey::new_unique(),
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
            coin_wallet: Pubkey::new_unique(),
            price_wallet: Pubkey::new_unique(),
        };
        (params, accounts)
    }

    #[test]
    fn test_record_fits_market_state() {
        let (params, accounts) = sample();
        let len = MarketCapacity::default()
            .size_of(MarketRole::MarketState)
            .expect("size");
        let mut data = vec![0u8; len as usize];

        let record = MarketStateRecord::new(&params, &accounts, 3);
        record.pack(&mut data).expect("pack");

        let unpacked = MarketStateRecord::unpack(&data).expect("unpack");
        assert_eq!(unpacked.params(), params);
        assert_eq!(unpacked.accounts(), accounts);
        assert_eq!(unpacked.vault_signer_nonce, 3);
        assert_eq!(read_flags(&data), Ok(flags_for(MarketRole::MarketState)));
    }

    #[test]
    fn test_unpack_zeroed_fails() {
        let data = vec![0u8; 388];
        assert!(MarketStateRecord::unpack(&data).is_err());
        assert_eq!(read_flags(&data), Ok(0));
    }

    #[test]
    fn test_write_flags_frames_account() {
        let mut data = vec![0u8; 64];
        write_flags(&mut data, MarketRole::Bids).expect("write");

        assert_eq!(&data[..5], HEAD_PADDING);
        assert_eq!(&data[57..], TAIL_PADDING);
        assert_eq!(read_flags(&data), Ok(account_flag::INITIALIZED | account_flag::BIDS));
    }

    #[test]
    fn test_write_flags_too_small() {
        let mut data = vec![0u8; 12];
        assert!(write_flags(&mut data, MarketRole::Asks).is_err());
    }

    #[test]
    fn test_read_flags_corrupt_frame() {
        let mut data = vec![0u8; 32];
        data[0] = 1;
        assert!(read_flags(&data).is_err());
    }
}
