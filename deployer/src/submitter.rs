//! Transaction submission for the deployer.
//!
//! Sends a transaction, retrying transport failures with exponential
//! backoff, then waits on the environment's confirmation notification.
//! Once a transaction has been accepted it is never re-sent here.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::signature::Keypair;
use tracing::{debug, warn};

use super::builder::BuiltTransaction;
use super::environment::{EnvironmentError, ExecutionEnvironment, RejectReason, TransactionOutcome};
use super::error::DeployError;
use super::metrics::DeployMetrics;

/// Configuration for the transaction submitter.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Maximum attempts to hand a transaction to the environment.
    pub max_retries: u32,

    /// Initial backoff in milliseconds.
    pub initial_backoff_ms: u64,

    /// Backoff multiplier.
    pub backoff_multiplier: f64,

    /// Maximum backoff in milliseconds.
    pub max_backoff_ms: u64,

    /// Confirmation timeout in milliseconds.
    pub confirmation_timeout_ms: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
            confirmation_timeout_ms: 30_000,
        }
    }
}

/// Result of a transaction submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Transaction confirmed successfully.
    Confirmed {
        /// Transaction signature.
        signature: String,
        /// Slot confirmed.
        slot: u64,
    },

    /// Transaction rejected; nothing was applied.
    Rejected {
        /// Transaction signature.
        signature: String,
        /// Rejection reason.
        reason: RejectReason,
    },

    /// Transaction accepted but not confirmed in time.
    Dropped {
        /// Transaction signature.
        signature: String,
    },
}

impl SubmitResult {
    /// Returns true if the transaction was confirmed.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Returns the signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        match self {
            Self::Confirmed { signature, .. }
            | Self::Rejected { signature, .. }
            | Self::Dropped { signature } => signature,
        }
    }
}

/// Transaction submitter for the deployer.
#[derive(Debug, Clone)]
pub struct TransactionSubmitter {
    /// Configuration.
    config: SubmitterConfig,

    /// Metrics.
    metrics: Option<Arc<DeployMetrics>>,
}

impl TransactionSubmitter {
    /// Creates a new transaction submitter.
    #[must_use]
    pub fn new(config: SubmitterConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Creates a submitter with metrics.
    #[must_use]
    pub fn with_metrics(config: SubmitterConfig, metrics: Arc<DeployMetrics>) -> Self {
        Self {
            config,
            metrics: Some(metrics),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Returns the confirmation timeout.
    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.confirmation_timeout_ms)
    }

    /// Submits a transaction and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::EnvironmentUnavailable` if the environment never
    /// accepted the transaction.
    pub async fn submit<E: ExecutionEnvironment>(
        &self,
        env: &E,
        tx: &BuiltTransaction,
        signers: &[&Keypair],
    ) -> Result<SubmitResult, DeployError> {
        let submission = self.send_with_retry(env, tx, signers).await?;
        let signature = submission.signature;

        if let Some(metrics) = &self.metrics {
            metrics.record_submission();
        }
        debug!("Submitted {:?} transaction {}", tx.kind, signature);

        let result = match tokio::time::timeout(self.confirmation_timeout(), submission.confirmation)
            .await
        {
            Ok(Ok(TransactionOutcome::Confirmed { slot })) => {
                SubmitResult::Confirmed { signature, slot }
            }
            Ok(Ok(TransactionOutcome::Rejected(reason))) => {
                SubmitResult::Rejected { signature, reason }
            }
            Ok(Err(_)) => {
                warn!("Confirmation channel closed for {}", signature);
                SubmitResult::Dropped { signature }
            }
            Err(_) => {
                warn!(
                    "Transaction {} not confirmed within {:?}",
                    signature,
                    self.confirmation_timeout()
                );
                SubmitResult::Dropped { signature }
            }
        };

        if let Some(metrics) = &self.metrics {
            match &result {
                SubmitResult::Confirmed { .. } => metrics.record_confirmed(),
                SubmitResult::Rejected { .. } => metrics.record_rejected(),
                SubmitResult::Dropped { .. } => metrics.record_dropped(),
            }
        }

        Ok(result)
    }

    /// Hands a transaction to the environment, retrying transport failures.
    async fn send_with_retry<E: ExecutionEnvironment>(
        &self,
        env: &E,
        tx: &BuiltTransaction,
        signers: &[&Keypair],
    ) -> Result<super::environment::Submission, DeployError> {
        let attempts = self.config.max_retries.max(1);
        let mut retry = 0;

        loop {
            match env.send_transaction(tx, signers).await {
                Ok(submission) => return Ok(submission),
                Err(EnvironmentError::Unavailable(msg)) => {
                    retry += 1;
                    if retry >= attempts {
                        return Err(DeployError::EnvironmentUnavailable(msg));
                    }

                    let backoff = self.calculate_backoff(retry - 1);
                    warn!(
                        "Send attempt {} of {} failed: {}; retrying in {:?}",
                        retry, attempts, msg, backoff
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry();
                    }
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Calculates the backoff duration for a given retry count.
    #[must_use]
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let backoff = self.config.initial_backoff_ms as f64
            * self.config.backoff_multiplier.powi(retry as i32);
        let backoff = (backoff as u64).min(self.config.max_backoff_ms);
        Duration::from_millis(backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransactionBuilder;
    use crate::ledger::LocalLedger;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signer;

    fn fast_config() -> SubmitterConfig {
        SubmitterConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10,
            confirmation_timeout_ms: 50,
        }
    }

    fn empty_batch(payer: Pubkey) -> BuiltTransaction {
        let exchange = Pubkey::new_unique();
        TransactionBuilder::new(exchange, exchange).build_create_accounts(payer, &[])
    }

    #[test]
    fn test_submitter_config_default() {
        let config = SubmitterConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_submit_result_signature() {
        let confirmed = SubmitResult::Confirmed {
            signature: "sig1".to_string(),
            slot: 100,
        };
        let dropped = SubmitResult::Dropped {
            signature: "sig2".to_string(),
        };

        assert!(confirmed.is_confirmed());
        assert!(!dropped.is_confirmed());
        assert_eq!(confirmed.signature(), "sig1");
        assert_eq!(dropped.signature(), "sig2");
    }

    #[test]
    fn test_submitter_calculate_backoff() {
        let config = SubmitterConfig {
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
            ..Default::default()
        };
        let submitter = TransactionSubmitter::new(config);

        assert_eq!(submitter.calculate_backoff(0), Duration::from_millis(100));
        assert_eq!(submitter.calculate_backoff(1), Duration::from_millis(200));
        assert_eq!(submitter.calculate_backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_submitter_calculate_backoff_max() {
        let config = SubmitterConfig {
            initial_backoff_ms: 1000,
            backoff_multiplier: 10.0,
            max_backoff_ms: 5000,
            ..Default::default()
        };
        let submitter = TransactionSubmitter::new(config);

        assert_eq!(submitter.calculate_backoff(2), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_submit_confirmed() {
        let ledger = LocalLedger::new(Pubkey::new_unique());
        let payer = Keypair::new();
        ledger.airdrop(&payer.pubkey(), 1_000_000).await;

        let metrics = Arc::new(DeployMetrics::new());
        let submitter = TransactionSubmitter::with_metrics(fast_config(), Arc::clone(&metrics));

        let result = submitter
            .submit(&ledger, &empty_batch(payer.pubkey()), &[&payer])
            .await
            .expect("submit");

        assert!(result.is_confirmed());
        assert_eq!(metrics.transactions_confirmed(), 1);
    }

    #[tokio::test]
    async fn test_submit_retries_outage() {
        let ledger = LocalLedger::new(Pubkey::new_unique());
        let payer = Keypair::new();
        ledger.airdrop(&payer.pubkey(), 1_000_000).await;
        ledger.inject_outage(2).await;

        let metrics = Arc::new(DeployMetrics::new());
        let submitter = TransactionSubmitter::with_metrics(fast_config(), Arc::clone(&metrics));

        let result = submitter
            .submit(&ledger, &empty_batch(payer.pubkey()), &[&payer])
            .await
            .expect("submit");

        assert!(result.is_confirmed());
        assert_eq!(metrics.transport_retries(), 2);
    }

    #[tokio::test]
    async fn test_submit_outage_exhausts_retries() {
        let ledger = LocalLedger::new(Pubkey::new_unique());
        let payer = Keypair::new();
        ledger.inject_outage(5).await;

        let submitter = TransactionSubmitter::new(fast_config());
        let result = submitter
            .submit(&ledger, &empty_batch(payer.pubkey()), &[&payer])
            .await;

        assert!(matches!(result, Err(DeployError::EnvironmentUnavailable(_))));
    }

    #[tokio::test]
    async fn test_submit_withheld_confirmation_is_dropped() {
        let ledger = LocalLedger::new(Pubkey::new_unique());
        let payer = Keypair::new();
        ledger.airdrop(&payer.pubkey(), 1_000_000).await;
        ledger.inject_withheld_confirmation(false).await;

        let metrics = Arc::new(DeployMetrics::new());
        let submitter = TransactionSubmitter::with_metrics(fast_config(), Arc::clone(&metrics));

        let result = submitter
            .submit(&ledger, &empty_batch(payer.pubkey()), &[&payer])
            .await
            .expect("submit");

        assert!(matches!(result, SubmitResult::Dropped { .. }));
        assert_eq!(metrics.transactions_dropped(), 1);
    }
}
