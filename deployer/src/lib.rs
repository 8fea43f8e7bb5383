//! Market deployer - provisions and initializes order-book markets.
//!
//! Bootstrapping a market is a strictly ordered two-phase sequence. Phase 1
//! creates every account too large for the exchange program to allocate
//! itself, in one atomic batch funded at rent minimums. Phase 2 submits the
//! single initialize instruction that moves all market accounts from zeroed
//! to active at once and emits an `InitializedEvent`.
//!
//! # Components
//!
//! - [`config`]: Deployer configuration
//! - [`environment`]: Execution environment contract
//! - [`builder`]: Transaction building
//! - [`submitter`]: Transaction submission and confirmation
//! - [`provisioner`]: Phase 1 account provisioning
//! - [`initializer`]: Phase 2 market initialization
//! - [`notifier`]: Program event listeners
//! - [`service`]: Two-phase deploy service
//! - [`ledger`]: In-memory environment for rehearsals and tests
//! - [`metrics`]: Deployer metrics

pub mod builder;
pub mod config;
pub mod environment;
pub mod error;
pub mod identities;
pub mod initializer;
pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod provisioner;
pub mod service;
pub mod submitter;

pub use builder::{BuiltTransaction, TransactionBuilder};
pub use config::{ConfigError, DeployerConfig};
pub use environment::{ExecutionEnvironment, RentEstimator};
pub use error::{DeployError, Phase, RetryClass};
pub use identities::MarketKeypairs;
pub use initializer::{InitResult, MarketInitializer, MarketLifecycle};
pub use ledger::LocalLedger;
pub use metrics::DeployMetrics;
pub use notifier::{InitializationNotifier, Listener};
pub use provisioner::{AccountProvisioner, AccountSpec, ProvisionResult};
pub use service::{DeployReport, DeployService};
pub use submitter::{SubmitterConfig, TransactionSubmitter};
