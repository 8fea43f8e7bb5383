//! Market account roles.
//!
//! Every market is backed by one account per role. Each role has a fixed
//! per-slot layout in the exchange program.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role an account plays in a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRole {
    /// Incoming order requests waiting for the matching engine.
    RequestQueue,
    /// Fills and outs emitted by the matching engine.
    EventQueue,
    /// Bid side of the book.
    Bids,
    /// Ask side of the book.
    Asks,
    /// Market header state.
    MarketState,
}

impl MarketRole {
    /// All roles, in the order the exchange program lists them.
    pub const ALL: [Self; 5] = [
        Self::MarketState,
        Self::RequestQueue,
        Self::EventQueue,
        Self::Bids,
        Self::Asks,
    ];

    /// Size in bytes of one slot of this role.
    #[must_use]
    pub const fn slot_size(&self) -> u64 {
        match self {
            Self::RequestQueue => 80,
            Self::EventQueue => 64,
            Self::Bids | Self::Asks => 64,
            Self::MarketState => 376,
        }
    }

    /// Slot count used when the deployer does not override it.
    #[must_use]
    pub const fn default_slots(&self) -> u64 {
        match self {
            Self::RequestQueue => 64,
            Self::EventQueue => 4096,
            Self::Bids | Self::Asks => 1024,
            Self::MarketState => 1,
        }
    }

    /// Returns a human-readable name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequestQueue => "request_queue",
            Self::EventQueue => "event_queue",
            Self::Bids => "bids",
            Self::Asks => "asks",
            Self::MarketState => "market_state",
        }
    }
}

impl fmt::Display for MarketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
