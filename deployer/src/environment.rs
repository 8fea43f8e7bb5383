//! Execution environment contract.
//!
//! The ledger runtime that executes transactions is an external
//! collaborator. The deployer only needs the narrow surface below: submit a
//! transaction and receive a confirmation notification, read balances and
//! accounts, query rent, and listen to program events.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use tokio::sync::oneshot;

use super::builder::BuiltTransaction;
use super::notifier::{Listener, ListenerId};

/// Errors reaching the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    /// Transport failure; the request was not accepted.
    #[error("environment unavailable: {0}")]
    Unavailable(String),
}

/// Reason the environment rejected a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Fee payer or owner cannot cover the transaction.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Lamports required.
        needed: u64,
        /// Lamports available.
        available: u64,
    },

    /// Account to create already exists.
    #[error("account {0} already in use")]
    AccountAlreadyInUse(Pubkey),

    /// Account expected to exist does not.
    #[error("account {0} not found")]
    MissingAccount(Pubkey),

    /// Required signature absent.
    #[error("missing signature for {0}")]
    MissingSignature(Pubkey),

    /// Account is no longer zeroed.
    #[error("account {0} already initialized")]
    AlreadyInitialized(Pubkey),

    /// Account length does not fit the exchange layout.
    #[error("account {address} has invalid size {len}")]
    InvalidAccountSize {
        /// Offending account.
        address: Pubkey,
        /// Its length.
        len: u64,
    },

    /// Account is owned by an unexpected program.
    #[error("account {0} has an unexpected owner")]
    InvalidAccountOwner(Pubkey),

    /// Both mints are the same.
    #[error("coin and price mints match")]
    MatchingMints,

    /// Instruction could not be processed.
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
}

/// Final outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Durably recorded at `slot`.
    Confirmed {
        /// Slot of confirmation.
        slot: u64,
    },
    /// Rejected as a whole; nothing was applied.
    Rejected(RejectReason),
}

/// A transaction accepted for processing.
#[derive(Debug)]
pub struct Submission {
    /// Transaction signature (base58).
    pub signature: String,

    /// Fires once the outcome is durable.
    pub confirmation: oneshot::Receiver<TransactionOutcome>,
}

/// Read-only view of a ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Balance in lamports.
    pub lamports: u64,
    /// Owning program.
    pub owner: Pubkey,
    /// Account data.
    pub data: Vec<u8>,
}

impl AccountSnapshot {
    /// Returns the data length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns true if the account holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Minimum balance lookup.
///
/// Re-queried for every size; the relationship is owned by the environment.
#[allow(async_fn_in_trait)]
pub trait RentEstimator {
    /// Minimum rent-exempt balance for an account of `byte_size`.
    async fn minimum_balance(&self, byte_size: u64) -> Result<u64, EnvironmentError>;
}

/// The execution environment the deployer talks to.
#[allow(async_fn_in_trait)]
pub trait ExecutionEnvironment: RentEstimator {
    /// Balance of an identity, zero if unknown.
    async fn balance(&self, address: &Pubkey) -> Result<u64, EnvironmentError>;

    /// Reads an account.
    async fn account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>, EnvironmentError>;

    /// Submits a transaction signed by `signers`.
    ///
    /// The whole transaction is applied atomically or not at all.
    async fn send_transaction(
        &self,
        tx: &BuiltTransaction,
        signers: &[&Keypair],
    ) -> Result<Submission, EnvironmentError>;

    /// Funds an identity. Only available in rehearsal and test contexts.
    async fn request_funding(
        &self,
        address: &Pubkey,
        lamports: u64,
    ) -> Result<Submission, EnvironmentError>;

    /// Registers a listener for exchange program events.
    async fn subscribe(&self) -> Result<Listener, EnvironmentError>;

    /// Removes a listener.
    async fn unsubscribe(&self, id: ListenerId) -> Result<(), EnvironmentError>;
}
