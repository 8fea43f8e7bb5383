//! Deployer metrics.
//!
//! Provides atomic counters for monitoring bootstrap runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics for the deployer.
#[derive(Debug)]
pub struct DeployMetrics {
    /// Transactions accepted by the environment.
    transactions_submitted: AtomicU64,

    /// Transactions confirmed.
    transactions_confirmed: AtomicU64,

    /// Transactions rejected.
    transactions_rejected: AtomicU64,

    /// Transactions without an observed confirmation.
    transactions_dropped: AtomicU64,

    /// Sends retried after a transport failure.
    transport_retries: AtomicU64,

    /// Accounts created in phase 1.
    accounts_created: AtomicU64,

    /// Lamports moved into new accounts in phase 1.
    lamports_committed: AtomicU64,

    /// Markets initialized.
    markets_initialized: AtomicU64,

    /// Start time for uptime.
    start_time: Instant,
}

impl Default for DeployMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployMetrics {
    /// Creates a new metrics instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transactions_submitted: AtomicU64::new(0),
            transactions_confirmed: AtomicU64::new(0),
            transactions_rejected: AtomicU64::new(0),
            transactions_dropped: AtomicU64::new(0),
            transport_retries: AtomicU64::new(0),
            accounts_created: AtomicU64::new(0),
            lamports_committed: AtomicU64::new(0),
            markets_initialized: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records a transaction accepted for processing.
    pub fn record_submission(&self) {
        self.transactions_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a confirmed transaction.
    pub fn record_confirmed(&self) {
        self.transactions_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rejected transaction.
    pub fn record_rejected(&self) {
        self.transactions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a transaction whose confirmation was not observed.
    pub fn record_dropped(&self) {
        self.transactions_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retried send.
    pub fn record_retry(&self) {
        self.transport_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a confirmed account batch.
    pub fn record_provisioned(&self, accounts: u64, lamports: u64) {
        self.accounts_created.fetch_add(accounts, Ordering::Relaxed);
        self.lamports_committed.fetch_add(lamports, Ordering::Relaxed);
    }

    /// Records an initialized market.
    pub fn record_initialized(&self) {
        self.markets_initialized.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns transactions submitted.
    #[must_use]
    pub fn transactions_submitted(&self) -> u64 {
        self.transactions_submitted.load(Ordering::Relaxed)
    }

    /// Returns transactions confirmed.
    #[must_use]
    pub fn transactions_confirmed(&self) -> u64 {
        self.transactions_confirmed.load(Ordering::Relaxed)
    }

    /// Returns transactions rejected.
    #[must_use]
    pub fn transactions_rejected(&self) -> u64 {
        self.transactions_rejected.load(Ordering::Relaxed)
    }

    /// Returns transactions dropped.
    #[must_use]
    pub fn transactions_dropped(&self) -> u64 {
        self.transactions_dropped.load(Ordering::Relaxed)
    }

    /// Returns transport retries.
    #[must_use]
    pub fn transport_retries(&self) -> u64 {
        self.transport_retries.load(Ordering::Relaxed)
    }

    /// Returns accounts created.
    #[must_use]
    pub fn accounts_created(&self) -> u64 {
        self.accounts_created.load(Ordering::Relaxed)
    }

    /// Returns lamports committed.
    #[must_use]
    pub fn lamports_committed(&self) -> u64 {
        self.lamports_committed.load(Ordering::Relaxed)
    }

    /// Returns markets initialized.
    #[must_use]
    pub fn markets_initialized(&self) -> u64 {
        self.markets_initialized.load(Ordering::Relaxed)
    }

    /// Returns the uptime.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the confirmation rate (0.0 to 1.0).
    #[must_use]
    pub fn confirmation_rate(&self) -> f64 {
        let submitted = self.transactions_submitted();
        if submitted > 0 {
            self.transactions_confirmed() as f64 / submitted as f64
        } else {
            0.0
        }
    }

    /// Returns a snapshot of all metrics.
    #[must_use]
    pub fn snapshot(&self) -> DeployMetricsSnapshot {
        DeployMetricsSnapshot {
            transactions_submitted: self.transactions_submitted(),
            transactions_confirmed: self.transactions_confirmed(),
            transactions_rejected: self.transactions_rejected(),
            transactions_dropped: self.transactions_dropped(),
            transport_retries: self.transport_retries(),
            accounts_created: self.accounts_created(),
            lamports_committed: self.lamports_committed(),
            markets_initialized: self.markets_initialized(),
            uptime_ms: self.uptime().as_millis() as u64,
            confirmation_rate: self.confirmation_rate(),
        }
    }
}

/// A point-in-time snapshot of deployer metrics.
#[derive(Debug, Clone, Serialize)]
pub struct DeployMetricsSnapshot {
    /// Transactions submitted.
    pub transactions_submitted: u64,
    /// Transactions confirmed.
    pub transactions_confirmed: u64,
    /// Transactions rejected.
    pub transactions_rejected: u64,
    /// Transactions dropped.
    pub transactions_dropped: u64,
    /// Transport retries.
    pub transport_retries: u64,
    /// Accounts created.
    pub accounts_created: u64,
    /// Lamports committed.
    pub lamports_committed: u64,
    /// Markets initialized.
    pub markets_initialized: u64,
    /// Uptime in milliseconds.
    pub uptime_ms: u64,
    /// Confirmation rate.
    pub confirmation_rate: f64,
}
