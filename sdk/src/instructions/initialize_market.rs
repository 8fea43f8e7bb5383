//! InitializeMarket instruction builder.
//!
//! Builds the single instruction that writes the market header and binds the
//! queues, book sides and wallets to the market.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    sysvar,
};

use crate::error::SdkError;
use crate::types::{MarketAccounts, MarketParameters};

/// SPL Token program ID.
pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// System program ID.
pub const SYSTEM_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("11111111111111111111111111111111");

/// Instruction discriminator for `initialize`.
pub const INITIALIZE_DISCRIMINATOR: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];

/// Number of accounts the instruction expects.
pub const INITIALIZE_ACCOUNT_COUNT: usize = 14;

/// Positions of the accounts in the instruction.
pub mod account_index {
    /// Paying owner.
    pub const OWNER: usize = 0;
    /// Base asset mint.
    pub const COIN_MINT: usize = 1;
    /// Quote asset mint.
    pub const PRICE_MINT: usize = 2;
    /// Market header.
    pub const MARKET_STATE: usize = 3;
    /// Request queue.
    pub const REQUEST_QUEUE: usize = 4;
    /// Event queue.
    pub const EVENT_QUEUE: usize = 5;
    /// Bids.
    pub const BIDS: usize = 6;
    /// Asks.
    pub const ASKS: usize = 7;
    /// Base asset wallet.
    pub const COIN_WALLET: usize = 8;
    /// Quote asset wallet.
    pub const PRICE_WALLET: usize = 9;
    /// System program.
    pub const SYSTEM_PROGRAM: usize = 10;
    /// Token program.
    pub const TOKEN_PROGRAM: usize = 11;
    /// Rent sysvar.
    pub const RENT: usize = 12;
    /// Exchange program.
    pub const EXCHANGE_PROGRAM: usize = 13;
}

/// Instruction arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InitializeMarketArgs {
    /// Base asset atoms per lot.
    pub coin_lot_size: u64,
    /// Quote asset atoms per lot.
    pub pc_lot_size: u64,
    /// Dust threshold.
    pub pc_dust_threshold: u64,
}

impl InitializeMarketArgs {
    /// Decodes instruction data.
    ///
    /// # Errors
    ///
    /// Returns an error if the discriminator is wrong or the body is malformed.
    pub fn unpack(data: &[u8]) -> Result<Self, SdkError> {
        let body = data
            .strip_prefix(INITIALIZE_DISCRIMINATOR.as_slice())
            .ok_or_else(|| SdkError::Deserialization("not an initialize instruction".to_string()))?;

        Self::try_from_slice(body).map_err(|e| SdkError::Deserialization(e.to_string()))
    }
}

impl From<&MarketParameters> for InitializeMarketArgs {
    fn from(params: &MarketParameters) -> Self {
        Self {
            coin_lot_size: params.coin_lot_size,
            pc_lot_size: params.pc_lot_size,
            pc_dust_threshold: params.pc_dust_threshold,
        }
    }
}

/// Builder for the InitializeMarket instruction.
#[derive(Debug, Clone)]
pub struct InitializeMarketBuilder {
    program_id: Pubkey,
    exchange_program: Pubkey,
    owner: Option<Pubkey>,
    params: Option<MarketParameters>,
    accounts: Option<MarketAccounts>,
}

impl InitializeMarketBuilder {
    /// Creates a new builder.
    ///
    /// `program_id` is the program receiving the instruction and
    /// `exchange_program` the program that will own the market accounts.
    /// They are the same program unless a deploy wrapper is in use.
    #[must_use]
    pub fn new(program_id: Pubkey, exchange_program: Pubkey) -> Self {
        Self {
            program_id,
            exchange_program,
            owner: None,
            params: None,
            accounts: None,
        }
    }

    /// Sets the owner paying for program-allocated accounts.
    #[must_use]
    pub fn owner(mut self, owner: Pubkey) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Sets the market parameters.
    #[must_use]
    pub fn params(mut self, params: MarketParameters) -> Self {
        self.params = Some(params);
        self
    }

    /// Sets the market account bundle.
    #[must_use]
    pub fn accounts(mut self, accounts: MarketAccounts) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Builds the instruction.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is not set or the parameters
    /// are invalid.
    pub fn build(self) -> Result<Instruction, SdkError> {
        let owner = self
            .owner
            .ok_or_else(|| SdkError::InvalidAddress("owner not set".to_string()))?;
        let params = self
            .params
            .ok_or_else(|| SdkError::Serialization("params not set".to_string()))?;
        let accounts = self
            .accounts
            .ok_or_else(|| SdkError::InvalidAddress("accounts not set".to_string()))?;

        params.validate()?;

        let metas = vec![
            AccountMeta::new(owner, true),
            AccountMeta::new_readonly(params.coin_mint, false),
            AccountMeta::new_readonly(params.price_mint, false),
            AccountMeta::new(accounts.market_state, true),
            AccountMeta::new(accounts.request_queue, true),
            AccountMeta::new(accounts.event_queue, true),
            AccountMeta::new(accounts.bids, true),
            AccountMeta::new(accounts.asks, true),
            AccountMeta::new(accounts.coin_wallet, true),
            AccountMeta::new(accounts.price_wallet, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
            AccountMeta::new_readonly(self.exchange_program, false),
        ];

        let mut data = INITIALIZE_DISCRIMINATOR.to_vec();
        data.extend(
            borsh::to_vec(&InitializeMarketArgs::from(&params))
                .map_err(|e| SdkError::Serialization(e.to_string()))?,
        );

        Ok(Instruction {
            program_id: self.program_id,
            accounts: metas,
            data,
        })
    }
}

/// Returns the addresses an instruction requires signatures from.
#[must_use]
pub fn required_signers(ix: &Instruction) -> Vec<Pubkey> {
    ix.accounts
        .iter()
        .filter(|meta| meta.is_signer)
        .map(|meta| meta.pubkey)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> MarketAccounts {
        MarketAccounts {
            market_state: Pubkey::new_unique(),
            request_queue: Pubkey::new_unique(),
            event_queue: Pubkey::new_unique(),
            bids: Pubkey::new_unique(),
            asks: Pubkey::new_unique(),
            coin_wallet: Pubkey::new_unique(),
            price_wallet: Pubkey::new_unique(),
        }
    }

    fn params() -> MarketParameters {
        MarketParameters::new(Pubkey::new_unique(), Pubkey::new_unique())
            .with_lot_sizes(10, 10)
            .with_dust_threshold(1)
    }

    #[test]
    fn test_initialize_builder_build() {
        let program_id = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let accounts = accounts();
        let params = params();

        let ix = InitializeMarketBuilder::new(program_id, program_id)
            .owner(owner)
            .params(params)
            .accounts(accounts)
            .build()
            .expect("should build instruction");

        assert_eq!(ix.program_id, program_id);
        assert_eq!(ix.accounts.len(), INITIALIZE_ACCOUNT_COUNT);
        assert_eq!(ix.accounts[account_index::OWNER].pubkey, owner);
        assert_eq!(
            ix.accounts[account_index::EVENT_QUEUE].pubkey,
            accounts.event_queue
        );
        assert_eq!(ix.accounts[account_index::COIN_MINT].pubkey, params.coin_mint);
        assert!(!ix.accounts[account_index::COIN_MINT].is_writable);
    }

    #[test]
    fn test_initialize_builder_signers() {
        let program_id = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let accounts = accounts();

        let ix = InitializeMarketBuilder::new(program_id, program_id)
            .owner(owner)
            .params(params())
            .accounts(accounts)
            .build()
            .expect("should build instruction");

        let signers = required_signers(&ix);
        assert_eq!(signers.len(), 8);
        assert_eq!(signers[0], owner);
        for address in accounts.all() {
            assert!(signers.contains(&address));
        }
    }

    #[test]
    fn test_initialize_args_roundtrip_from_data() {
        let program_id = Pubkey::new_unique();
        let params = params();

        let ix = InitializeMarketBuilder::new(program_id, program_id)
            .owner(Pubkey::new_unique())
            .params(params)
            .accounts(accounts())
            .build()
            .expect("should build instruction");

        let args = InitializeMarketArgs::unpack(&ix.data).expect("unpack");
        assert_eq!(args.coin_lot_size, 10);
        assert_eq!(args.pc_lot_size, 10);
        assert_eq!(args.pc_dust_threshold, 1);
    }

    #[test]
    fn test_initialize_args_wrong_discriminator() {
        let data = vec![0u8; 32];
        assert!(InitializeMarketArgs::unpack(&data).is_err());
    }

    #[test]
    fn test_initialize_builder_missing_owner() {
        let result = InitializeMarketBuilder::new(Pubkey::new_unique(), Pubkey::new_unique())
            .params(params())
            .accounts(accounts())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_initialize_builder_matching_mints() {
        let mint = Pubkey::new_unique();
        let result = InitializeMarketBuilder::new(Pubkey::new_unique(), Pubkey::new_unique())
            .owner(Pubkey::new_unique())
            .params(MarketParameters::new(mint, mint))
            .accounts(accounts())
            .build();
        assert_eq!(result.err(), Some(SdkError::MatchingMints));
    }
}
