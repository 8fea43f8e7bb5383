//! Market deployer binary.
//!
//! Rehearses a full market deployment against the in-memory ledger and
//! prints the deploy report and metrics as JSON.

use std::env;

use anyhow::Context;
use marketdeploy_deployer::{
    DeployService, DeployerConfig, ExecutionEnvironment, LocalLedger, MarketKeypairs,
};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marketdeploy_deployer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let exchange_program =
        env::var("EXCHANGE_PROGRAM_ID").unwrap_or_else(|_| Pubkey::new_unique().to_string());
    let defaults = DeployerConfig::default();
    let config = DeployerConfig::with_exchange_program(exchange_program)
        .with_confirmation_timeout(env_or(
            "CONFIRMATION_TIMEOUT_MS",
            defaults.confirmation_timeout_ms,
        )?)
        .with_event_timeout(env_or("EVENT_TIMEOUT_MS", defaults.event_timeout_ms)?)
        .with_max_retries(env_or("MAX_RETRIES", defaults.max_retries)?)
        .with_lot_sizes(
            env_or("COIN_LOT_SIZE", defaults.coin_lot_size)?,
            env_or("PC_LOT_SIZE", defaults.pc_lot_size)?,
            env_or("PC_DUST_THRESHOLD", defaults.pc_dust_threshold)?,
        );
    let funding: u64 = env_or("OWNER_FUNDING_LAMPORTS", 10_000_000_000)?;

    let service = DeployService::new(config).context("invalid deployer configuration")?;

    tracing::info!("Starting market deployment rehearsal");
    tracing::info!("Exchange program: {}", service.exchange_program());
    tracing::info!(
        "Lot sizes: coin={} pc={} dust={}",
        service.config().coin_lot_size,
        service.config().pc_lot_size,
        service.config().pc_dust_threshold
    );

    let ledger = LocalLedger::new(*service.exchange_program());

    let coin_mint = Pubkey::new_unique();
    let price_mint = Pubkey::new_unique();
    ledger.create_mint(&coin_mint).await;
    ledger.create_mint(&price_mint).await;

    let owner = Keypair::new();
    let funded = ledger
        .request_funding(&owner.pubkey(), funding)
        .await
        .context("funding request failed")?;
    funded
        .confirmation
        .await
        .context("funding was not confirmed")?;
    tracing::info!("Owner {} funded with {} lamports", owner.pubkey(), funding);

    let keys = MarketKeypairs::generate();
    let report = service
        .deploy(&ledger, &owner, coin_mint, price_mint, &keys)
        .await
        .context("deployment failed")?;

    println!("{}", report.to_json()?);
    println!(
        "{}",
        serde_json::to_string_pretty(&service.metrics().snapshot())?
    );

    tracing::info!("Market {} is live", report.market_state);
    Ok(())
}
