//! Fresh identities for the accounts of one market.

use std::fmt;

use marketdeploy_sdk::{MarketAccounts, MarketRole};
use solana_sdk::signature::{Keypair, Signer};

/// Keypairs for the seven accounts backing a market.
///
/// Every account co-signs the initialize instruction, and client-provisioned
/// accounts also co-sign their creation batch.
pub struct MarketKeypairs {
    /// Market header.
    pub market_state: Keypair,
    /// Request queue.
    pub request_queue: Keypair,
    /// Event queue.
    pub event_queue: Keypair,
    /// Bids.
    pub bids: Keypair,
    /// Asks.
    pub asks: Keypair,
    /// Base asset wallet.
    pub coin_wallet: Keypair,
    /// Quote asset wallet.
    pub price_wallet: Keypair,
}

impl MarketKeypairs {
    /// Generates seven fresh keypairs.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            market_state: Keypair::new(),
            request_queue: Keypair::new(),
            event_queue: Keypair::new(),
            bids: Keypair::new(),
            asks: Keypair::new(),
            coin_wallet: Keypair::new(),
            price_wallet: Keypair::new(),
        }
    }

    /// Returns the account addresses.
    #[must_use]
    pub fn accounts(&self) -> MarketAccounts {
        MarketAccounts {
            market_state: self.market_state.pubkey(),
            request_queue: self.request_queue.pubkey(),
            event_queue: self.event_queue.pubkey(),
            bids: self.bids.pubkey(),
            asks: self.asks.pubkey(),
            coin_wallet: self.coin_wallet.pubkey(),
            price_wallet: self.price_wallet.pubkey(),
        }
    }

    /// Returns the keypair for a role.
    #[must_use]
    pub const fn for_role(&self, role: MarketRole) -> &Keypair {
        match role {
            MarketRole::MarketState => &self.market_state,
            MarketRole::RequestQueue => &self.request_queue,
            MarketRole::EventQueue => &self.event_queue,
            MarketRole::Bids => &self.bids,
            MarketRole::Asks => &self.asks,
        }
    }

    /// Returns all seven keypairs in [`MarketAccounts::all`] order.
    #[must_use]
    pub fn signers(&self) -> [&Keypair; 7] {
        [
            &self.market_state,
            &self.request_queue,
            &self.event_queue,
            &self.bids,
            &self.asks,
            &self.coin_wallet,
            &self.price_wallet,
        ]
    }
}

impl fmt::Debug for MarketKeypairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketKeypairs")
            .field("accounts", &self.accounts())
            .finish()
    }
}
