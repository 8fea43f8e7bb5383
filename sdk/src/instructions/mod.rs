//! Instruction builders for market bootstrap.
//!
//! # Example
//!
//! ```rust,ignore
//! use marketdeploy_sdk::instructions::InitializeMarketBuilder;
//!
//! let ix = InitializeMarketBuilder::new(program_id, program_id)
//!     .owner(owner)
//!     .params(params)
//!     .accounts(accounts)
//!     .build()?;
//! ```

pub mod initialize_market;
pub mod vault;

pub use initialize_market::{
    required_signers, InitializeMarketArgs, InitializeMarketBuilder, INITIALIZE_DISCRIMINATOR,
    SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
pub use vault::{find_vault_signer, vault_signer_address};
