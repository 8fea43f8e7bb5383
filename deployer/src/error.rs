//! Deployment error types.
//!
//! Every error carries a [`RetryClass`] telling the caller whether the whole
//! sequence can be retried, whether on-chain state must be read back first,
//! or whether the failure is terminal.

use std::fmt;

use marketdeploy_sdk::{MarketRole, SdkError};
use solana_sdk::pubkey::Pubkey;

use super::config::ConfigError;
use super::environment::{EnvironmentError, RejectReason};

/// Phase of the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Account creation batch.
    Provision,
    /// Initialize instruction.
    Initialize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision => f.write_str("provision"),
            Self::Initialize => f.write_str("initialize"),
        }
    }
}

/// How a caller may react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Nothing was applied; the sequence can be retried as is.
    RetrySequence,
    /// A submission went out without an observed confirmation. Read the
    /// market state back before retrying.
    InspectState,
    /// Retrying cannot succeed without new inputs.
    Terminal,
}

/// Deployment errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
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

    /// Owner cannot cover rent and fees.
    #[error("insufficient funds: need {needed} lamports, have {available}")]
    InsufficientFunds {
        /// Lamports required.
        needed: u64,
        /// Lamports held by the owner.
        available: u64,
    },

    /// A fresh identity is already recorded on the ledger.
    #[error("identity {0} is already in use")]
    DuplicateIdentity(Pubkey),

    /// Confirmation was not observed within the configured timeout.
    #[error("{phase} transaction {signature} was not confirmed in time")]
    ConfirmationTimeout {
        /// Phase that timed out.
        phase: Phase,
        /// Signature of the unconfirmed transaction.
        signature: String,
    },

    /// A referenced account does not exist.
    #[error("account {0} does not exist")]
    MissingAccount(Pubkey),

    /// A required co-signer did not sign.
    #[error("missing signature from {0}")]
    SignatureMismatch(Pubkey),

    /// The market header is no longer zeroed.
    #[error("account {0} is already initialized")]
    AlreadyInitialized(Pubkey),

    /// An account does not match the layout the exchange expects.
    #[error("account {address} has invalid size {len}")]
    InvalidAccountSize {
        /// Offending account.
        address: Pubkey,
        /// Its length in bytes.
        len: u64,
    },

    /// No vault signer nonce was found for the market.
    #[error("no valid vault signer nonce was found")]
    NonceNotFound,

    /// Rejection that has no dedicated variant.
    #[error("{phase} transaction rejected: {reason}")]
    Rejected {
        /// Phase that was rejected.
        phase: Phase,
        /// Rejection reason.
        reason: String,
    },

    /// The execution environment could not be reached.
    #[error("environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// Other SDK failure.
    #[error(transparent)]
    Sdk(SdkError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DeployError {
    /// Maps a rejection reported by the environment.
    #[must_use]
    pub fn from_rejection(phase: Phase, reason: RejectReason) -> Self {
        match reason {
            RejectReason::InsufficientFunds { needed, available } => {
                Self::InsufficientFunds { needed, available }
            }
            RejectReason::AccountAlreadyInUse(address) => match phase {
                Phase::Provision => Self::DuplicateIdentity(address),
                Phase::Initialize => Self::AlreadyInitialized(address),
            },
            RejectReason::AlreadyInitialized(address) => Self::AlreadyInitialized(address),
            RejectReason::MissingAccount(address) => Self::MissingAccount(address),
            RejectReason::MissingSignature(address) => Self::SignatureMismatch(address),
            RejectReason::InvalidAccountSize { address, len } => {
                Self::InvalidAccountSize { address, len }
            }
            RejectReason::MatchingMints => Self::MatchingMints,
            other => Self::Rejected {
                phase,
                reason: other.to_string(),
            },
        }
    }

    /// Returns how the caller may react.
    #[must_use]
    pub const fn retry_class(&self) -> RetryClass {
        match self {
            Self::EnvironmentUnavailable(_) => RetryClass::RetrySequence,
            Self::ConfirmationTimeout { .. } => RetryClass::InspectState,
            _ => RetryClass::Terminal,
        }
    }

    /// Returns true if a retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self.retry_class(), RetryClass::Terminal)
    }

    /// Returns true if on-chain state must be read before retrying.
    #[must_use]
    pub const fn requires_state_check(&self) -> bool {
        matches!(self.retry_class(), RetryClass::InspectState)
    }
}

impl From<SdkError> for DeployError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::InvalidCapacity { role, slots } => Self::InvalidCapacity { role, slots },
            SdkError::MatchingMints => Self::MatchingMints,
            SdkError::InvalidLotSize(msg) => Self::InvalidLotSize(msg),
            SdkError::NonceNotFound => Self::NonceNotFound,
            other => Self::Sdk(other),
        }
    }
}

impl From<EnvironmentError> for DeployError {
    fn from(err: EnvironmentError) -> Self {
        match err {
            EnvironmentError::Unavailable(msg) => Self::EnvironmentUnavailable(msg),
        }
    }
}
