//! Phase 2: market initialization.
//!
//! Submits the single initialize instruction that moves every market
//! account from zeroed to active in one atomic step, then waits for the
//! exchange program's `InitializedEvent`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use marketdeploy_sdk::sizing::TOKEN_ACCOUNT_LEN;
use marketdeploy_sdk::types::state::is_zeroed;
use marketdeploy_sdk::{
    InitializedEvent, MarketAccounts, MarketCapacity, MarketParameters, MarketRole,
    MarketStateRecord,
};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, info, warn};

use super::builder::{BuiltTransaction, TransactionBuilder};
use super::environment::{ExecutionEnvironment, RentEstimator};
use super::error::{DeployError, Phase};
use super::metrics::DeployMetrics;
use super::notifier::Listener;
use super::submitter::{SubmitResult, TransactionSubmitter};

/// A confirmed initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitResult {
    /// Transaction signature.
    pub signature: String,

    /// Confirmation slot.
    pub slot: u64,

    /// The event, if it arrived within the event timeout.
    pub event: Option<InitializedEvent>,

    /// When the confirmation was observed.
    pub confirmed_at: DateTime<Utc>,
}

/// Lifecycle of a market header account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketLifecycle {
    /// No account at the address.
    Missing,
    /// Account exists and is zeroed.
    Uninitialized,
    /// Account holds an initialized market.
    Active(Box<MarketStateRecord>),
}

impl MarketLifecycle {
    /// Returns true if the market is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Initializes markets.
#[derive(Debug, Clone)]
pub struct MarketInitializer {
    /// Transaction builder.
    builder: TransactionBuilder,

    /// Transaction submitter.
    submitter: TransactionSubmitter,

    /// How long to wait for the event after confirmation.
    event_timeout: Duration,

    /// Metrics.
    metrics: Option<Arc<DeployMetrics>>,
}

impl MarketInitializer {
    /// Creates a new initializer.
    #[must_use]
    pub fn new(
        builder: TransactionBuilder,
        submitter: TransactionSubmitter,
        event_timeout: Duration,
    ) -> Self {
        Self {
            builder,
            submitter,
            event_timeout,
            metrics: None,
        }
    }

    /// Attaches metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<DeployMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Estimates what initialization costs the owner.
    ///
    /// Covers the transaction fee plus rent for every account the exchange
    /// program allocates during initialization: the roles `capacity` leaves
    /// to the program and both token wallets. Rent is queried per account.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters or capacity are invalid, or rent
    /// cannot be queried.
    pub async fn estimated_cost<R: RentEstimator>(
        &self,
        rent: &R,
        owner: &Pubkey,
        params: &MarketParameters,
        accounts: &MarketAccounts,
        capacity: &MarketCapacity,
    ) -> Result<u64, DeployError> {
        let tx = self.builder.build_initialize(*owner, params, accounts)?;
        let mut needed = tx.fee();

        for role in MarketRole::ALL {
            if !capacity.is_client_provisioned(role)? {
                let lamports = rent.minimum_balance(capacity.size_of(role)?).await?;
                needed = needed.saturating_add(lamports);
            }
        }
        for wallet in [accounts.coin_wallet, accounts.price_wallet] {
            let lamports = rent.minimum_balance(TOKEN_ACCOUNT_LEN).await?;
            debug!("Wallet {} needs {} lamports", wallet, lamports);
            needed = needed.saturating_add(lamports);
        }

        Ok(needed)
    }

    /// Initializes a market.
    ///
    /// `co_signers` must hold the keypair of every address in `accounts`.
    /// The event listener is registered before submission and removed
    /// afterwards on every path.
    ///
    /// # Errors
    ///
    /// Returns `SignatureMismatch` before submitting if a co-signer is
    /// absent. The environment may report `MissingAccount`,
    /// `AlreadyInitialized`, `InvalidAccountSize` or `InsufficientFunds`.
    /// Returns `ConfirmationTimeout` if the outcome was not observed.
    pub async fn initialize<E: ExecutionEnvironment>(
        &self,
        env: &E,
        owner: &Keypair,
        params: &MarketParameters,
        accounts: &MarketAccounts,
        co_signers: &[&Keypair],
    ) -> Result<InitResult, DeployError> {
        params.validate()?;

        let tx = self
            .builder
            .build_initialize(owner.pubkey(), params, accounts)?;

        let mut signers: Vec<&Keypair> = Vec::with_capacity(co_signers.len() + 1);
        signers.push(owner);
        signers.extend_from_slice(co_signers);
        check_signers(&tx, &signers)?;

        let mut listener = env.subscribe().await?;
        let listener_id = listener.id();

        let result = self.submit_and_observe(env, &tx, &signers, &mut listener).await;

        if let Err(e) = env.unsubscribe(listener_id).await {
            warn!("Failed to remove listener {}: {}", listener_id, e);
        }

        let result = result?;
        if let Some(metrics) = &self.metrics {
            metrics.record_initialized();
        }
        info!(
            "Market {} initialized in {} at slot {}",
            accounts.market_state, result.signature, result.slot
        );
        Ok(result)
    }

    async fn submit_and_observe<E: ExecutionEnvironment>(
        &self,
        env: &E,
        tx: &BuiltTransaction,
        signers: &[&Keypair],
        listener: &mut Listener,
    ) -> Result<InitResult, DeployError> {
        let (signature, slot) = match self.submitter.submit(env, tx, signers).await? {
            SubmitResult::Confirmed { signature, slot } => (signature, slot),
            SubmitResult::Rejected { signature, reason } => {
                warn!("Initialize {} rejected: {}", signature, reason);
                return Err(DeployError::from_rejection(Phase::Initialize, reason));
            }
            SubmitResult::Dropped { signature } => {
                return Err(DeployError::ConfirmationTimeout {
                    phase: Phase::Initialize,
                    signature,
                });
            }
        };
        let confirmed_at = Utc::now();

        let event = match tokio::time::timeout(
            self.event_timeout,
            wait_for_event(listener, &signature),
        )
        .await
        {
            Ok(event) => event,
            Err(_) => {
                warn!(
                    "No InitializedEvent for {} within {:?}",
                    signature, self.event_timeout
                );
                None
            }
        };

        Ok(InitResult {
            signature,
            slot,
            event,
            confirmed_at,
        })
    }

    /// Reads the lifecycle of a market header account.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment is unreachable or the account
    /// holds something other than a market.
    pub async fn read_state<E: ExecutionEnvironment>(
        &self,
        env: &E,
        market_state: &Pubkey,
    ) -> Result<MarketLifecycle, DeployError> {
        let Some(account) = env.account(market_state).await? else {
            return Ok(MarketLifecycle::Missing);
        };

        if is_zeroed(&account.data) {
            return Ok(MarketLifecycle::Uninitialized);
        }

        let record = MarketStateRecord::unpack(&account.data)?;
        Ok(MarketLifecycle::Active(Box::new(record)))
    }
}

async fn wait_for_event(listener: &mut Listener, signature: &str) -> Option<InitializedEvent> {
    while let Some((event, log)) = listener.next_initialized().await {
        if log.signature == signature {
            return Some(event);
        }
        debug!("Ignoring InitializedEvent from {}", log.signature);
    }
    None
}

fn check_signers(tx: &BuiltTransaction, signers: &[&Keypair]) -> Result<(), DeployError> {
    let present: Vec<Pubkey> = signers.iter().map(|k| k.pubkey()).collect();
    match tx.required_signers.iter().find(|k| !present.contains(k)) {
        Some(missing) => Err(DeployError::SignatureMismatch(*missing)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identities::MarketKeypairs;
    use crate::ledger::LocalLedger;
    use crate::provisioner::{AccountProvisioner, AccountSpec};
    use crate::submitter::SubmitterConfig;

    struct Fixture {
        ledger: LocalLedger,
        owner: Keypair,
        keys: MarketKeypairs,
        params: MarketParameters,
        metrics: Arc<DeployMetrics>,
        initializer: MarketInitializer,
        provisioner: AccountProvisioner,
    }

    async fn fixture() -> Fixture {
        let exchange = Pubkey::new_unique();
        let ledger = LocalLedger::new(exchange);
        let owner = Keypair::new();
        ledger.airdrop(&owner.pubkey(), 20_000_000_000).await;

        let coin_mint = Pubkey::new_unique();
        let price_mint = Pubkey::new_unique();
        ledger.create_mint(&coin_mint).await;
        ledger.create_mint(&price_mint).await;

        let config = SubmitterConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            confirmation_timeout_ms: 50,
            ..Default::default()
        };
        let metrics = Arc::new(DeployMetrics::new());
        let builder = TransactionBuilder::new(exchange, exchange);
        let submitter = TransactionSubmitter::with_metrics(config, Arc::clone(&metrics));

        Fixture {
            ledger,
            owner,
            keys: MarketKeypairs::generate(),
            params: MarketParameters::new(coin_mint, price_mint)
                .with_lot_sizes(10, 10)
                .with_dust_threshold(1),
            initializer: MarketInitializer::new(
                builder.clone(),
                submitter.clone(),
                Duration::from_millis(100),
            )
            .with_metrics(Arc::clone(&metrics)),
            provisioner: AccountProvisioner::new(builder, submitter),
            metrics,
        }
    }

    async fn provision(f: &Fixture) {
        let specs = f
            .provisioner
            .plan(&f.ledger, &MarketCapacity::default())
            .await
            .expect("plan");
        let pairs: Vec<(AccountSpec, &Keypair)> = specs
            .iter()
            .map(|spec| (*spec, f.keys.for_role(spec.role)))
            .collect();
        f.provisioner
            .provision(&f.ledger, &f.owner, &pairs)
            .await
            .expect("provision");
    }

    async fn initialize(f: &Fixture) -> Result<InitResult, DeployError> {
        f.initializer
            .initialize(
                &f.ledger,
                &f.owner,
                &f.params,
                &f.keys.accounts(),
                &f.keys.signers(),
            )
            .await
    }

    #[tokio::test]
    async fn test_initialize_emits_event() {
        let f = fixture().await;
        provision(&f).await;

        let result = initialize(&f).await.expect("initialize");

        let event = result.event.expect("event");
        assert_eq!(event.coin_mint, f.params.coin_mint);
        assert_eq!(event.price_mint, f.params.price_mint);
        assert_eq!(f.metrics.markets_initialized(), 1);
        assert_eq!(f.ledger.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_estimated_cost_matches_charge() {
        let f = fixture().await;
        provision(&f).await;

        let estimate = f
            .initializer
            .estimated_cost(
                &f.ledger,
                &f.owner.pubkey(),
                &f.params,
                &f.keys.accounts(),
                &MarketCapacity::default(),
            )
            .await
            .expect("estimate");
        let before = f.ledger.balance(&f.owner.pubkey()).await.expect("env");

        initialize(&f).await.expect("initialize");

        let after = f.ledger.balance(&f.owner.pubkey()).await.expect("env");
        assert_eq!(before - after, estimate);
    }

    #[tokio::test]
    async fn test_initialize_twice_already_initialized() {
        let f = fixture().await;
        provision(&f).await;

        initialize(&f).await.expect("first initialize");
        let second = initialize(&f).await;

        assert_eq!(
            second.err(),
            Some(DeployError::AlreadyInitialized(f.keys.market_state.pubkey()))
        );
        assert_eq!(f.metrics.markets_initialized(), 1);
        assert_eq!(f.ledger.listener_count().await, 0);
    }

    #[tokio::test]
    async fn test_initialize_missing_account() {
        let f = fixture().await;

        let result = initialize(&f).await;

        assert_eq!(
            result.err(),
            Some(DeployError::MissingAccount(f.keys.event_queue.pubkey()))
        );
        assert_eq!(f.ledger.listener_count().await, 0);
        assert_eq!(
            f.initializer
                .read_state(&f.ledger, &f.keys.market_state.pubkey())
                .await
                .expect("read"),
            MarketLifecycle::Missing
        );
    }

    #[tokio::test]
    async fn test_initialize_signature_mismatch() {
        let f = fixture().await;
        provision(&f).await;
        let before = f.ledger.transaction_count().await;

        let signers = f.keys.signers();
        let partial: Vec<&Keypair> = signers
            .iter()
            .copied()
            .filter(|k| k.pubkey() != f.keys.bids.pubkey())
            .collect();

        let result = f
            .initializer
            .initialize(&f.ledger, &f.owner, &f.params, &f.keys.accounts(), &partial)
            .await;

        assert_eq!(
            result.err(),
            Some(DeployError::SignatureMismatch(f.keys.bids.pubkey()))
        );
        assert_eq!(f.ledger.transaction_count().await, before);
    }

    #[tokio::test]
    async fn test_initialize_matching_mints() {
        let f = fixture().await;
        let params = MarketParameters::new(f.params.coin_mint, f.params.coin_mint);

        let result = f
            .initializer
            .initialize(
                &f.ledger,
                &f.owner,
                &params,
                &f.keys.accounts(),
                &f.keys.signers(),
            )
            .await;

        assert_eq!(result.err(), Some(DeployError::MatchingMints));
        assert_eq!(f.ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_initialize_timeout_then_read_back() {
        let f = fixture().await;
        provision(&f).await;
        f.ledger.inject_withheld_confirmation(true).await;

        let err = initialize(&f).await.expect_err("timeout");
        assert!(matches!(
            err,
            DeployError::ConfirmationTimeout {
                phase: Phase::Initialize,
                ..
            }
        ));
        assert!(err.requires_state_check());
        assert_eq!(f.ledger.listener_count().await, 0);

        let state = f
            .initializer
            .read_state(&f.ledger, &f.keys.market_state.pubkey())
            .await
            .expect("read");
        match state {
            MarketLifecycle::Active(record) => {
                assert_eq!(record.params(), f.params);
                assert_eq!(record.accounts(), f.keys.accounts());
            }
            other => panic!("expected active market, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initialize_timeout_not_applied_can_resubmit() {
        let f = fixture().await;
        provision(&f).await;
        f.ledger.inject_withheld_confirmation(false).await;

        let err = initialize(&f).await.expect_err("timeout");
        assert!(err.requires_state_check());

        let state = f
            .initializer
            .read_state(&f.ledger, &f.keys.market_state.pubkey())
            .await
            .expect("read");
        assert_eq!(state, MarketLifecycle::Missing);

        let result = initialize(&f).await.expect("resubmit");
        assert!(result.event.is_some());
    }

    #[tokio::test]
    async fn test_read_state_uninitialized() {
        let f = fixture().await;
        let exchange = *f.ledger.exchange_program();
        let market_state = Keypair::new();
        let spec = AccountSpec {
            role: marketdeploy_sdk::MarketRole::MarketState,
            byte_size: 388,
            required_balance: crate::ledger::rent_exempt_minimum(388),
            owning_program: exchange,
        };
        f.provisioner
            .provision(&f.ledger, &f.owner, &[(spec, &market_state)])
            .await
            .expect("provision");

        let state = f
            .initializer
            .read_state(&f.ledger, &market_state.pubkey())
            .await
            .expect("read");
        assert_eq!(state, MarketLifecycle::Uninitialized);
        assert!(!state.is_active());
    }
}
