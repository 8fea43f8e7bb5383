//! Core types for market bootstrap.
//!
//! Roles, parameters, the persisted market header and program events.

pub mod event;
pub mod market;
pub mod role;
pub mod state;

pub use event::InitializedEvent;
pub use market::{MarketAccounts, MarketParameters};
pub use role::MarketRole;
pub use state::MarketStateRecord;
