//! Deployer configuration.
//!
//! Provides configuration options for the bootstrap sequence.

use marketdeploy_sdk::{MarketCapacity, MarketParameters};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::submitter::SubmitterConfig;

/// Configuration for the deployer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Exchange program that owns the market accounts (base58-encoded).
    pub exchange_program: String,

    /// Confirmation timeout in milliseconds.
    pub confirmation_timeout_ms: u64,

    /// How long to wait for the initialized event in milliseconds.
    pub event_timeout_ms: u64,

    /// Maximum attempts to reach the environment per transaction.
    pub max_retries: u32,

    /// Initial backoff in milliseconds.
    pub initial_backoff_ms: u64,

    /// Backoff multiplier for retries.
    pub backoff_multiplier: f64,

    /// Maximum backoff in milliseconds.
    pub max_backoff_ms: u64,

    /// Slot counts of the market accounts.
    pub capacity: MarketCapacity,

    /// Base asset atoms per lot.
    pub coin_lot_size: u64,

    /// Quote asset atoms per lot.
    pub pc_lot_size: u64,

    /// Quote dust threshold.
    pub pc_dust_threshold: u64,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            exchange_program: String::new(),
            confirmation_timeout_ms: 30_000,
            event_timeout_ms: 5_000,
            max_retries: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
            capacity: MarketCapacity::default(),
            coin_lot_size: 10,
            pc_lot_size: 10,
            pc_dust_threshold: 1,
        }
    }
}

impl DeployerConfig {
    /// Creates a configuration targeting the given exchange program.
    #[must_use]
    pub fn with_exchange_program(exchange_program: impl Into<String>) -> Self {
        Self {
            exchange_program: exchange_program.into(),
            ..Default::default()
        }
    }

    /// Sets the confirmation timeout.
    #[must_use]
    pub fn with_confirmation_timeout(mut self, ms: u64) -> Self {
        self.confirmation_timeout_ms = ms;
        self
    }

    /// Sets the event timeout.
    #[must_use]
    pub fn with_event_timeout(mut self, ms: u64) -> Self {
        self.event_timeout_ms = ms;
        self
    }

    /// Sets the maximum retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, initial_ms: u64, multiplier: f64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.backoff_multiplier = multiplier;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Sets the market capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: MarketCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets lot sizes and dust threshold.
    #[must_use]
    pub fn with_lot_sizes(mut self, coin: u64, pc: u64, dust_threshold: u64) -> Self {
        self.coin_lot_size = coin;
        self.pc_lot_size = pc;
        self.pc_dust_threshold = dust_threshold;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse_exchange_program()?;

        if self.confirmation_timeout_ms == 0 || self.event_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidBackoffMultiplier);
        }

        if self.coin_lot_size == 0 || self.pc_lot_size == 0 {
            return Err(ConfigError::InvalidLotSize);
        }

        self.capacity
            .validate()
            .map_err(|e| ConfigError::InvalidCapacity(e.to_string()))
    }

    /// Parses the exchange program id from base58.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn parse_exchange_program(&self) -> Result<Pubkey, ConfigError> {
        let invalid = || ConfigError::InvalidProgramId(self.exchange_program.clone());

        let bytes = bs58::decode(&self.exchange_program)
            .into_vec()
            .map_err(|_| invalid())?;

        let arr: [u8; 32] = bytes.try_into().map_err(|_| invalid())?;
        Ok(Pubkey::new_from_array(arr))
    }

    /// Returns market parameters for a mint pair using the configured lots.
    #[must_use]
    pub fn market_parameters(&self, coin_mint: Pubkey, price_mint: Pubkey) -> MarketParameters {
        MarketParameters::new(coin_mint, price_mint)
            .with_lot_sizes(self.coin_lot_size, self.pc_lot_size)
            .with_dust_threshold(self.pc_dust_threshold)
    }

    /// Returns the submitter configuration.
    #[must_use]
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
            backoff_multiplier: self.backoff_multiplier,
            max_backoff_ms: self.max_backoff_ms,
            confirmation_timeout_ms: self.confirmation_timeout_ms,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid exchange program id.
    #[error("invalid exchange program id: {0:?}")]
    InvalidProgramId(String),

    /// Invalid timeout.
    #[error("timeouts must be > 0")]
    InvalidTimeout,

    /// Invalid backoff multiplier.
    #[error("backoff_multiplier must be >= 1.0")]
    InvalidBackoffMultiplier,

    /// Invalid market capacity.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),

    /// Invalid lot size.
    #[error("lot sizes must be > 0")]
    InvalidLotSize,
}
