//! Deploy service.
//!
//! Runs the strictly ordered two-phase bootstrap: size and fund the
//! client-provisioned accounts, wait for their confirmation, then initialize
//! the market and wait for its event.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use marketdeploy_sdk::{MarketAccounts, MarketParameters, MarketRole};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, info, warn};

use super::builder::TransactionBuilder;
use super::config::DeployerConfig;
use super::environment::ExecutionEnvironment;
use super::error::DeployError;
use super::identities::MarketKeypairs;
use super::initializer::{InitResult, MarketInitializer, MarketLifecycle};
use super::metrics::DeployMetrics;
use super::provisioner::{AccountProvisioner, AccountSpec, ProvisionResult};
use super::submitter::TransactionSubmitter;

/// An account created in phase 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedAccount {
    /// Role of the account.
    pub role: MarketRole,
    /// Address (base58).
    pub address: String,
    /// Data length in bytes.
    pub byte_size: u64,
    /// Lamports funded.
    pub lamports: u64,
}

/// Summary of a completed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    /// Exchange program (base58).
    pub exchange_program: String,
    /// Base asset mint (base58).
    pub coin_mint: String,
    /// Quote asset mint (base58).
    pub price_mint: String,
    /// Market header (base58).
    pub market_state: String,
    /// Request queue (base58).
    pub request_queue: String,
    /// Event queue (base58).
    pub event_queue: String,
    /// Bids (base58).
    pub bids: String,
    /// Asks (base58).
    pub asks: String,
    /// Base asset wallet (base58).
    pub coin_wallet: String,
    /// Quote asset wallet (base58).
    pub price_wallet: String,
    /// Accounts created in phase 1.
    pub provisioned: Vec<ProvisionedAccount>,
    /// Phase 1 signature, absent if nothing was created.
    pub provision_signature: Option<String>,
    /// Phase 2 signature.
    pub initialize_signature: String,
    /// Phase 2 slot.
    pub initialize_slot: u64,
    /// Whether the InitializedEvent was observed.
    pub event_observed: bool,
    /// When phase 2 was confirmed.
    pub initialized_at: DateTime<Utc>,
}

impl DeployReport {
    fn new(
        exchange_program: &Pubkey,
        params: &MarketParameters,
        accounts: &MarketAccounts,
        provisioned: &ProvisionResult,
        initialized: &InitResult,
    ) -> Self {
        Self {
            exchange_program: exchange_program.to_string(),
            coin_mint: params.coin_mint.to_string(),
            price_mint: params.price_mint.to_string(),
            market_state: accounts.market_state.to_string(),
            request_queue: accounts.request_queue.to_string(),
            event_queue: accounts.event_queue.to_string(),
            bids: accounts.bids.to_string(),
            asks: accounts.asks.to_string(),
            coin_wallet: accounts.coin_wallet.to_string(),
            price_wallet: accounts.price_wallet.to_string(),
            provisioned: provisioned
                .accounts
                .iter()
                .map(|(spec, address)| ProvisionedAccount {
                    role: spec.role,
                    address: address.to_string(),
                    byte_size: spec.byte_size,
                    lamports: spec.required_balance,
                })
                .collect(),
            provision_signature: provisioned.signature.clone(),
            initialize_signature: initialized.signature.clone(),
            initialize_slot: initialized.slot,
            event_observed: initialized.event.is_some(),
            initialized_at: initialized.confirmed_at,
        }
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// The deploy service.
pub struct DeployService {
    /// Configuration.
    config: DeployerConfig,

    /// Exchange program id.
    exchange_program: Pubkey,

    /// Phase 1.
    provisioner: AccountProvisioner,

    /// Phase 2.
    initializer: MarketInitializer,

    /// Metrics.
    metrics: Arc<DeployMetrics>,
}

impl DeployService {
    /// Creates a new deploy service.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: DeployerConfig) -> Result<Self, DeployError> {
        config.validate()?;
        let exchange_program = config.parse_exchange_program()?;

        let metrics = Arc::new(DeployMetrics::new());
        let builder = TransactionBuilder::new(exchange_program, exchange_program);
        let submitter =
            TransactionSubmitter::with_metrics(config.submitter_config(), Arc::clone(&metrics));

        Ok(Self {
            provisioner: AccountProvisioner::new(builder.clone(), submitter.clone()),
            initializer: MarketInitializer::new(
                builder,
                submitter,
                Duration::from_millis(config.event_timeout_ms),
            )
            .with_metrics(Arc::clone(&metrics)),
            config,
            exchange_program,
            metrics,
        })
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> Arc<DeployMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DeployerConfig {
        &self.config
    }

    /// Returns the exchange program id.
    #[must_use]
    pub const fn exchange_program(&self) -> &Pubkey {
        &self.exchange_program
    }

    /// Returns the phase 2 initializer.
    #[must_use]
    pub const fn initializer(&self) -> &MarketInitializer {
        &self.initializer
    }

    /// Deploys a market for a mint pair.
    ///
    /// Phase 2 starts only after phase 1 is confirmed. No step is retried
    /// automatically after a submission went out.
    ///
    /// # Errors
    ///
    /// Returns the first error of either phase. Use
    /// [`DeployError::retry_class`] to decide how to continue.
    pub async fn deploy<E: ExecutionEnvironment>(
        &self,
        env: &E,
        owner: &Keypair,
        coin_mint: Pubkey,
        price_mint: Pubkey,
        keys: &MarketKeypairs,
    ) -> Result<DeployReport, DeployError> {
        let params = self.config.market_parameters(coin_mint, price_mint);
        params.validate()?;

        info!(
            "Deploying market {} for {}/{}",
            keys.market_state.pubkey(),
            coin_mint,
            price_mint
        );

        let specs = self.provisioner.plan(env, &self.config.capacity).await?;
        self.run_phases(env, owner, &params, keys, &specs).await
    }

    /// Resumes an interrupted deployment.
    ///
    /// Client-provisioned accounts that already exist with the right owner
    /// and size are not recreated. An already active market is reported as
    /// `AlreadyInitialized`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` for an active market, `DuplicateIdentity`
    /// or `InvalidAccountSize` for an existing account that cannot be
    /// reused, or the first error of the remaining phases.
    pub async fn resume<E: ExecutionEnvironment>(
        &self,
        env: &E,
        owner: &Keypair,
        coin_mint: Pubkey,
        price_mint: Pubkey,
        keys: &MarketKeypairs,
    ) -> Result<DeployReport, DeployError> {
        let params = self.config.market_parameters(coin_mint, price_mint);
        params.validate()?;

        let market_state = keys.market_state.pubkey();
        if let MarketLifecycle::Active(_) =
            self.initializer.read_state(env, &market_state).await?
        {
            return Err(DeployError::AlreadyInitialized(market_state));
        }

        let mut remaining = Vec::new();
        for spec in self.provisioner.plan(env, &self.config.capacity).await? {
            let address = keys.for_role(spec.role).pubkey();
            match env.account(&address).await? {
                None => remaining.push(spec),
                Some(account) if account.owner != self.exchange_program => {
                    return Err(DeployError::DuplicateIdentity(address));
                }
                Some(account) if account.len() != spec.byte_size => {
                    return Err(DeployError::InvalidAccountSize {
                        address,
                        len: account.len(),
                    });
                }
                Some(_) => debug!("{} at {} already provisioned", spec.role, address),
            }
        }

        info!(
            "Resuming market {} with {} accounts left to provision",
            market_state,
            remaining.len()
        );
        self.run_phases(env, owner, &params, keys, &remaining).await
    }

    async fn run_phases<E: ExecutionEnvironment>(
        &self,
        env: &E,
        owner: &Keypair,
        params: &MarketParameters,
        keys: &MarketKeypairs,
        specs: &[AccountSpec],
    ) -> Result<DeployReport, DeployError> {
        let pairs: Vec<(AccountSpec, &Keypair)> = specs
            .iter()
            .map(|spec| (*spec, keys.for_role(spec.role)))
            .collect();

        let accounts = keys.accounts();
        self.check_funding(env, owner, params, &accounts, &pairs).await?;

        let provisioned = self
            .provisioner
            .provision(env, owner, &pairs)
            .await
            .inspect_err(|e| warn!("Provision phase failed: {}", e))?;
        self.metrics.record_provisioned(
            provisioned.accounts.len() as u64,
            provisioned.lamports_committed,
        );

        let initialized = self
            .initializer
            .initialize(env, owner, params, &accounts, &keys.signers())
            .await
            .inspect_err(|e| warn!("Initialize phase failed: {}", e))?;

        Ok(DeployReport::new(
            &self.exchange_program,
            params,
            &accounts,
            &provisioned,
            &initialized,
        ))
    }

    /// Fails with `InsufficientFunds` unless the owner can pay for both
    /// phases, so an underfunded deploy leaves no accounts behind.
    async fn check_funding<E: ExecutionEnvironment>(
        &self,
        env: &E,
        owner: &Keypair,
        params: &MarketParameters,
        accounts: &MarketAccounts,
        pairs: &[(AccountSpec, &Keypair)],
    ) -> Result<(), DeployError> {
        let owner_key = owner.pubkey();
        let batch: Vec<(AccountSpec, Pubkey)> = pairs
            .iter()
            .map(|(spec, identity)| (*spec, identity.pubkey()))
            .collect();

        let provision_cost = self.provisioner.estimated_cost(&owner_key, &batch);
        let initialize_cost = self
            .initializer
            .estimated_cost(env, &owner_key, params, accounts, &self.config.capacity)
            .await?;
        let needed = provision_cost.saturating_add(initialize_cost);

        let available = env.balance(&owner_key).await?;
        if available < needed {
            warn!(
                "Owner {} holds {} lamports, deployment needs {} ({} provision, {} initialize)",
                owner_key, available, needed, provision_cost, initialize_cost
            );
            return Err(DeployError::InsufficientFunds { needed, available });
        }
        Ok(())
    }
}
