use std::sync::Arc;
use tracing::info;

use donation_engine::{Config, DonationCore, EngineMetrics, InMemoryChain, MirrorStore, Sweeper};
use ledger_contract::{AdminKeypair, Address, ContractParams, LedgerContract};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    info!(
        version = donation_engine::VERSION,
        "Donation engine starting"
    );

    let keypair = match config.admin_seed_bytes()? {
        Some(seed) => AdminKeypair::from_seed(&seed),
        None => {
            info!("No ADMIN_KEY_SEED configured, generating an ephemeral credential");
            AdminKeypair::generate()
        }
    };
    info!(admin = %keypair.address(), "Administrative credential loaded");

    let params = ContractParams {
        min_native_donation: config.contract.min_native_donation,
        withdrawal_cooldown_secs: config.contract.withdrawal_cooldown_secs,
        accepted_tokens: config
            .contract
            .accepted_tokens
            .iter()
            .map(Address::new)
            .collect(),
    };
    let contract = LedgerContract::new(keypair.address(), params);
    let provider = Arc::new(InMemoryChain::new(keypair.public_key(), contract));

    let store = MirrorStore::connect(&config.database.url, config.database.max_connections).await?;
    let metrics = Arc::new(EngineMetrics::new()?);

    let core = Arc::new(DonationCore::new(
        store,
        provider,
        keypair,
        &config,
        metrics,
    ));

    let mut sweeper = Sweeper::new().await?;
    sweeper.start(core.clone(), &config.reconciliation).await?;

    info!("Donation engine ready");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    sweeper.shutdown().await?;
    Ok(())
}
