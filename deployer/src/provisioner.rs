//! Phase 1: account provisioning.
//!
//! Creates every client-provisioned market account in a single atomic
//! batch. Each new account is sized for its role, funded at the rent
//! minimum the environment reports for that size, and owned by the exchange
//! program.

use marketdeploy_sdk::{MarketCapacity, MarketRole};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, info, warn};

use super::builder::TransactionBuilder;
use super::environment::{ExecutionEnvironment, RentEstimator};
use super::error::{DeployError, Phase};
use super::submitter::{SubmitResult, TransactionSubmitter};

/// An account to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSpec {
    /// Role of the account.
    pub role: MarketRole,

    /// Data length in bytes.
    pub byte_size: u64,

    /// Lamports to fund the account with.
    pub required_balance: u64,

    /// Program that will own the account.
    pub owning_program: Pubkey,
}

/// A confirmed account batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResult {
    /// Batch signature, `None` when nothing had to be created.
    pub signature: Option<String>,

    /// Confirmation slot.
    pub slot: Option<u64>,

    /// Created accounts in batch order.
    pub accounts: Vec<(AccountSpec, Pubkey)>,

    /// Lamports moved into the new accounts.
    pub lamports_committed: u64,
}

impl ProvisionResult {
    fn empty() -> Self {
        Self {
            signature: None,
            slot: None,
            accounts: Vec::new(),
            lamports_committed: 0,
        }
    }

    /// Returns the address created for a role.
    #[must_use]
    pub fn address_of(&self, role: MarketRole) -> Option<Pubkey> {
        self.accounts
            .iter()
            .find(|(spec, _)| spec.role == role)
            .map(|(_, address)| *address)
    }
}

/// Creates client-provisioned market accounts.
#[derive(Debug, Clone)]
pub struct AccountProvisioner {
    /// Transaction builder.
    builder: TransactionBuilder,

    /// Transaction submitter.
    submitter: TransactionSubmitter,
}

impl AccountProvisioner {
    /// Creates a new provisioner.
    #[must_use]
    pub fn new(builder: TransactionBuilder, submitter: TransactionSubmitter) -> Self {
        Self { builder, submitter }
    }

    /// Returns the program that will own created accounts.
    #[must_use]
    pub const fn exchange_program(&self) -> &Pubkey {
        self.builder.exchange_program()
    }

    /// Builds the spec of one account, querying rent for its size.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is invalid or rent cannot be queried.
    pub async fn spec_for<R: RentEstimator>(
        &self,
        rent: &R,
        capacity: &MarketCapacity,
        role: MarketRole,
    ) -> Result<AccountSpec, DeployError> {
        let byte_size = capacity.size_of(role)?;
        let required_balance = rent.minimum_balance(byte_size).await?;

        Ok(AccountSpec {
            role,
            byte_size,
            required_balance,
            owning_program: *self.exchange_program(),
        })
    }

    /// Plans every client-provisioned account for `capacity`.
    ///
    /// Rent is queried once per account; values are never reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is invalid or rent cannot be queried.
    pub async fn plan<R: RentEstimator>(
        &self,
        rent: &R,
        capacity: &MarketCapacity,
    ) -> Result<Vec<AccountSpec>, DeployError> {
        let mut specs = Vec::new();
        for role in capacity.client_provisioned_roles()? {
            specs.push(self.spec_for(rent, capacity, role).await?);
        }
        Ok(specs)
    }

    /// Returns what the batch creating `accounts` costs the owner in rent
    /// and fees. Nothing is submitted for an empty batch, so it costs zero.
    #[must_use]
    pub fn estimated_cost(&self, owner: &Pubkey, accounts: &[(AccountSpec, Pubkey)]) -> u64 {
        if accounts.is_empty() {
            return 0;
        }
        self.builder
            .build_create_accounts(*owner, accounts)
            .estimated_cost()
    }

    /// Creates every account in one atomic batch.
    ///
    /// Each `(spec, identity)` pair is created at the identity's address;
    /// every identity co-signs with `owner`. Either all accounts exist
    /// afterwards or none do.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` without submitting if the owner cannot
    /// cover rent and fees, `DuplicateIdentity` if an address is taken,
    /// `ConfirmationTimeout` if the batch outcome was not observed.
    pub async fn provision<E: ExecutionEnvironment>(
        &self,
        env: &E,
        owner: &Keypair,
        accounts: &[(AccountSpec, &Keypair)],
    ) -> Result<ProvisionResult, DeployError> {
        if accounts.is_empty() {
            debug!("No accounts to provision");
            return Ok(ProvisionResult::empty());
        }

        let pairs: Vec<(AccountSpec, Pubkey)> = accounts
            .iter()
            .map(|(spec, identity)| (*spec, identity.pubkey()))
            .collect();
        let tx = self.builder.build_create_accounts(owner.pubkey(), &pairs);

        let needed = tx.estimated_cost();
        let available = env.balance(&owner.pubkey()).await?;
        if available < needed {
            warn!(
                "Owner {} holds {} lamports, batch needs {}",
                owner.pubkey(),
                available,
                needed
            );
            return Err(DeployError::InsufficientFunds { needed, available });
        }

        let mut signers: Vec<&Keypair> = Vec::with_capacity(accounts.len() + 1);
        signers.push(owner);
        signers.extend(accounts.iter().map(|(_, identity)| *identity));

        info!(
            "Provisioning {} accounts ({} lamports)",
            pairs.len(),
            tx.lamports_committed()
        );

        match self.submitter.submit(env, &tx, &signers).await? {
            SubmitResult::Confirmed { signature, slot } => {
                for (spec, address) in &pairs {
                    debug!(
                        "Created {} at {} ({} bytes, {} lamports)",
                        spec.role, address, spec.byte_size, spec.required_balance
                    );
                }
                info!("Provision batch {} confirmed at slot {}", signature, slot);

                Ok(ProvisionResult {
                    signature: Some(signature),
                    slot: Some(slot),
                    lamports_committed: tx.lamports_committed(),
                    accounts: pairs,
                })
            }
            SubmitResult::Rejected { signature, reason } => {
                warn!("Provision batch {} rejected: {}", signature, reason);
                Err(DeployError::from_rejection(Phase::Provision, reason))
            }
            SubmitResult::Dropped { signature } => Err(DeployError::ConfirmationTimeout {
                phase: Phase::Provision,
                signature,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::environment::EnvironmentError;
    use crate::ledger::LocalLedger;
    use crate::submitter::SubmitterConfig;

    struct CountingRent {
        calls: AtomicU64,
    }

    impl RentEstimator for CountingRent {
        async fn minimum_balance(&self, byte_size: u64) -> Result<u64, EnvironmentError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(byte_size * 10)
        }
    }

    fn provisioner(exchange: Pubkey) -> AccountProvisioner {
        let config = SubmitterConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            confirmation_timeout_ms: 50,
            ..Default::default()
        };
        AccountProvisioner::new(
            TransactionBuilder::new(exchange, exchange),
            TransactionSubmitter::new(config),
        )
    }

    async fn funded_owner(ledger: &LocalLedger, lamports: u64) -> Keypair {
        let owner = Keypair::new();
        ledger.airdrop(&owner.pubkey(), lamports).await;
        owner
    }

    #[tokio::test]
    async fn test_plan_default_capacity() {
        let exchange = Pubkey::new_unique();
        let rent = CountingRent {
            calls: AtomicU64::new(0),
        };

        let specs = provisioner(exchange)
            .plan(&rent, &MarketCapacity::default())
            .await
            .expect("plan");

        let sizes: Vec<u64> = specs.iter().map(|s| s.byte_size).collect();
        assert_eq!(sizes, vec![262_156, 65_548, 65_548]);
        assert!(specs.iter().all(|s| s.required_balance == s.byte_size * 10));
        assert!(specs.iter().all(|s| s.owning_program == exchange));
        assert_eq!(rent.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_plan_queries_rent_every_time() {
        let rent = CountingRent {
            calls: AtomicU64::new(0),
        };
        let provisioner = provisioner(Pubkey::new_unique());

        provisioner
            .plan(&rent, &MarketCapacity::default())
            .await
            .expect("plan");
        provisioner
            .plan(&rent, &MarketCapacity::default())
            .await
            .expect("plan");

        assert_eq!(rent.calls.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn test_plan_invalid_capacity() {
        let rent = CountingRent {
            calls: AtomicU64::new(0),
        };
        let result = provisioner(Pubkey::new_unique())
            .plan(&rent, &MarketCapacity::default().with_event_queue_slots(0))
            .await;

        assert_eq!(
            result.err(),
            Some(DeployError::InvalidCapacity {
                role: MarketRole::EventQueue,
                slots: 0
            })
        );
    }

    #[tokio::test]
    async fn test_provision_creates_accounts() {
        let exchange = Pubkey::new_unique();
        let ledger = LocalLedger::new(exchange);
        let owner = funded_owner(&ledger, 10_000_000_000).await;
        let provisioner = provisioner(exchange);

        let specs = provisioner
            .plan(&ledger, &MarketCapacity::default())
            .await
            .expect("plan");
        let identities: Vec<Keypair> = specs.iter().map(|_| Keypair::new()).collect();
        let pairs: Vec<(AccountSpec, &Keypair)> = specs.iter().copied().zip(&identities).collect();

        let result = provisioner
            .provision(&ledger, &owner, &pairs)
            .await
            .expect("provision");

        assert_eq!(result.accounts.len(), 3);
        for (spec, address) in &result.accounts {
            let account = ledger.account(address).await.expect("env").expect("exists");
            assert_eq!(account.len(), spec.byte_size);
            assert_eq!(account.lamports, spec.required_balance);
            assert_eq!(account.owner, exchange);
            assert!(account.data.iter().all(|b| *b == 0));
        }
    }

    #[tokio::test]
    async fn test_provision_empty_batch() {
        let ledger = LocalLedger::new(Pubkey::new_unique());
        let owner = Keypair::new();

        let result = provisioner(Pubkey::new_unique())
            .provision(&ledger, &owner, &[])
            .await
            .expect("provision");

        assert!(result.accounts.is_empty());
        assert!(result.signature.is_none());
    }

    #[tokio::test]
    async fn test_provision_rejected_operation_leaves_nothing() {
        let exchange = Pubkey::new_unique();
        let ledger = LocalLedger::new(exchange);
        let owner = funded_owner(&ledger, 10_000_000_000).await;
        let provisioner = provisioner(exchange);

        let specs = provisioner
            .plan(&ledger, &MarketCapacity::default())
            .await
            .expect("plan");
        let identities: Vec<Keypair> = specs.iter().map(|_| Keypair::new()).collect();
        let pairs: Vec<(AccountSpec, &Keypair)> = specs.iter().copied().zip(&identities).collect();

        let before = ledger.account_count().await;
        ledger.inject_reject_operation(2).await;

        let result = provisioner.provision(&ledger, &owner, &pairs).await;

        assert!(matches!(
            result,
            Err(DeployError::Rejected {
                phase: Phase::Provision,
                ..
            })
        ));
        assert_eq!(ledger.account_count().await, before);
        for identity in &identities {
            assert!(ledger
                .account(&identity.pubkey())
                .await
                .expect("env")
                .is_none());
        }
        assert_eq!(
            ledger.balance(&owner.pubkey()).await.expect("env"),
            10_000_000_000
        );
    }

    #[tokio::test]
    async fn test_provision_insufficient_funds() {
        let exchange = Pubkey::new_unique();
        let ledger = LocalLedger::new(exchange);
        let owner = funded_owner(&ledger, 1_000_000).await;
        let provisioner = provisioner(exchange);

        let specs = provisioner
            .plan(&ledger, &MarketCapacity::default())
            .await
            .expect("plan");
        let identities: Vec<Keypair> = specs.iter().map(|_| Keypair::new()).collect();
        let pairs: Vec<(AccountSpec, &Keypair)> = specs.iter().copied().zip(&identities).collect();

        let before = ledger.account_count().await;
        let result = provisioner.provision(&ledger, &owner, &pairs).await;

        assert!(matches!(
            result,
            Err(DeployError::InsufficientFunds {
                available: 1_000_000,
                ..
            })
        ));
        assert_eq!(ledger.account_count().await, before);
        assert_eq!(ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_provision_duplicate_identity() {
        let exchange = Pubkey::new_unique();
        let ledger = LocalLedger::new(exchange);
        let owner = funded_owner(&ledger, 10_000_000_000).await;
        let provisioner = provisioner(exchange);

        let spec = provisioner
            .spec_for(&ledger, &MarketCapacity::default(), MarketRole::Bids)
            .await
            .expect("spec");
        let identity = Keypair::new();

        provisioner
            .provision(&ledger, &owner, &[(spec, &identity)])
            .await
            .expect("first provision");

        let result = provisioner
            .provision(&ledger, &owner, &[(spec, &identity)])
            .await;

        assert_eq!(
            result.err(),
            Some(DeployError::DuplicateIdentity(identity.pubkey()))
        );
    }

    #[tokio::test]
    async fn test_provision_withheld_confirmation_times_out() {
        let exchange = Pubkey::new_unique();
        let ledger = LocalLedger::new(exchange);
        let owner = funded_owner(&ledger, 10_000_000_000).await;
        let provisioner = provisioner(exchange);

        let spec = provisioner
            .spec_for(&ledger, &MarketCapacity::default(), MarketRole::Asks)
            .await
            .expect("spec");
        let identity = Keypair::new();
        ledger.inject_withheld_confirmation(true).await;

        let err = provisioner
            .provision(&ledger, &owner, &[(spec, &identity)])
            .await
            .expect_err("timeout");

        assert!(matches!(
            err,
            DeployError::ConfirmationTimeout {
                phase: Phase::Provision,
                ..
            }
        ));
        assert!(err.requires_state_check());
        // Applied despite the missing confirmation.
        assert!(ledger
            .account(&identity.pubkey())
            .await
            .expect("env")
            .is_some());
    }
}
