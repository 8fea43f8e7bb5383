//! Market parameter and account bundle types.

use std::collections::HashSet;

use solana_sdk::pubkey::Pubkey;

use super::role::MarketRole;
use crate::error::SdkError;

/// Parameters supplied by the deploying party.
///
/// Immutable once the market is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketParameters {
    /// Base asset mint.
    pub coin_mint: Pubkey,

    /// Quote asset mint.
    pub price_mint: Pubkey,

    /// Base asset atoms per lot.
    pub coin_lot_size: u64,

    /// Quote asset atoms per lot.
    pub pc_lot_size: u64,

    /// Quote amounts below this threshold are treated as dust.
    pub pc_dust_threshold: u64,
}

impl MarketParameters {
    /// Creates parameters for a mint pair.
    #[must_use]
    pub fn new(coin_mint: Pubkey, price_mint: Pubkey) -> Self {
        Self {
            coin_mint,
            price_mint,
            coin_lot_size: 1,
            pc_lot_size: 1,
            pc_dust_threshold: 0,
        }
    }

    /// Sets both lot sizes.
    #[must_use]
    pub fn with_lot_sizes(mut self, coin_lot_size: u64, pc_lot_size: u64) -> Self {
        self.coin_lot_size = coin_lot_size;
        self.pc_lot_size = pc_lot_size;
        self
    }

    /// Sets the dust threshold.
    #[must_use]
    pub fn with_dust_threshold(mut self, pc_dust_threshold: u64) -> Self {
        self.pc_dust_threshold = pc_dust_threshold;
        self
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the mints match or a lot size is zero.
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.coin_mint == self.price_mint {
            return Err(SdkError::MatchingMints);
        }

        if self.coin_lot_size == 0 {
            return Err(SdkError::InvalidLotSize(
                "coin_lot_size must be > 0".to_string(),
            ));
        }

        if self.pc_lot_size == 0 {
            return Err(SdkError::InvalidLotSize("pc_lot_size must be > 0".to_string()));
        }

        Ok(())
    }
}

/// Addresses of every account backing a market.
///
/// All addresses must be distinct. The protocol does not enforce this;
/// callers can check with [`MarketAccounts::all_distinct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketAccounts {
    /// Market header account.
    pub market_state: Pubkey,
    /// Request queue account.
    pub request_queue: Pubkey,
    /// Event queue account.
    pub event_queue: Pubkey,
    /// Bids account.
    pub bids: Pubkey,
    /// Asks account.
    pub asks: Pubkey,
    /// Base asset wallet held by the vault signer.
    pub coin_wallet: Pubkey,
    /// Quote asset wallet held by the vault signer.
    pub price_wallet: Pubkey,
}

impl MarketAccounts {
    /// Returns the address for a role.
    #[must_use]
    pub const fn address_of(&self, role: MarketRole) -> Pubkey {
        match role {
            MarketRole::MarketState => self.market_state,
            MarketRole::RequestQueue => self.request_queue,
            MarketRole::EventQueue => self.event_queue,
            MarketRole::Bids => self.bids,
            MarketRole::Asks => self.asks,
        }
    }

    /// Returns all seven addresses, roles first and wallets last.
    #[must_use]
    pub fn all(&self) -> [Pubkey; 7] {
        [
            self.market_state,
            self.request_queue,
            self.event_queue,
            self.bids,
            self.asks,
            self.coin_wallet,
            self.price_wallet,
        ]
    }

    /// Returns true if no address appears twice.
    #[must_use]
    pub fn all_distinct(&self) -> bool {
        let all = self.all();
        let unique: HashSet<&Pubkey> = all.iter().collect();
        unique.len() == all.len()
    }
}
