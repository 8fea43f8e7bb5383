//! Marketdeploy - bootstrap protocol for order-book markets on Solana.
//!
//! Facade over the workspace crates:
//!
//! - [`sdk`]: sizing, market types, the initialize instruction and events
//! - [`deployer`]: the two-phase provisioning and initialization sequence

pub use marketdeploy_deployer as deployer;
pub use marketdeploy_sdk as sdk;
