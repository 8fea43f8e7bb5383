//! SDK error types.
//!
//! Provides error types for sizing, parameter validation and serialization.

use crate::types::MarketRole;

/// SDK errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// Requested capacity cannot produce a valid account size.
    #[error("invalid capacity for {role}: {slots} slots")]
    InvalidCapacity {
        /// Role the size was requested for.
        role: MarketRole,
        /// Requested slot count.
        slots: u64,
    },

    /// Coin and price mints are the same asset.
    #[error("coin and price mints shouldn't match")]
    MatchingMints,

    /// Lot size of zero.
    #[error("invalid lot size: {0}")]
    InvalidLotSize(String),

    /// No nonce in range produced a valid vault signer address.
    #[error("no valid vault signer nonce was found")]
    NonceNotFound,

    /// Invalid address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
