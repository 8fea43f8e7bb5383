//! Market deploy SDK - core types for bootstrapping order-book markets.
//!
//! This crate provides the pure pieces of the bootstrap protocol: account
//! sizing, market parameters, the persisted market header layout, program
//! events and the initialize instruction builder.
//!
//! # Core Types
//!
//! - [`MarketRole`] — Role an account plays in a market
//! - [`MarketCapacity`] — Slot counts per role
//! - [`MarketParameters`] — Mints, lot sizes and dust threshold
//! - [`MarketAccounts`] — The seven market account addresses
//! - [`MarketStateRecord`] — Market header written at initialization
//! - [`InitializedEvent`] — Event emitted once a market is live
//!
//! # Example
//!
//! ```rust
//! use marketdeploy_sdk::{size_for, MarketRole};
//!
//! let bytes = size_for(MarketRole::EventQueue, 4096).expect("valid capacity");
//! assert_eq!(bytes, 262_144 + 12);
//! ```

pub mod error;
pub mod instructions;
pub mod sizing;
pub mod types;

pub use error::SdkError;
pub use sizing::{size_for, MarketCapacity, HEADER_OVERHEAD};
pub use types::{
    InitializedEvent, MarketAccounts, MarketParameters, MarketRole, MarketStateRecord,
};
