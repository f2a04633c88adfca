use anyhow::Result;
use clap::Parser;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payout_core::adapters::{PostgresAdminStore, PostgresTransactionRepository};
use payout_core::cli::{Cli, Commands};
use payout_core::config::Config;
use payout_core::secrets::SecretsManager;
use payout_core::services::{worker, AdminService, PaymentService, PaymentWorker};
use payout_core::stellar::SorobanRpcClient;
use payout_core::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Worker { once, limit } => run_worker_command(once, limit).await,
        Commands::Config => check_config(),
    }
}

async fn serve() -> Result<()> {
    let mut config = Config::from_env()?;
    resolve_hot_signer_secret(&mut config).await?;

    let pool = create_pool(&config).await?;
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let (state, payment_worker) = build_state(&config, pool);

    tokio::spawn(worker::run_worker(
        payment_worker,
        config.worker_interval_secs,
        config.worker_batch_limit,
    ));

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn run_worker_command(once: bool, limit: Option<i64>) -> Result<()> {
    let mut config = Config::from_env()?;
    resolve_hot_signer_secret(&mut config).await?;

    let pool = create_pool(&config).await?;
    let (_, payment_worker) = build_state(&config, pool);
    let batch_limit = limit.unwrap_or(config.worker_batch_limit);

    if once {
        let outcome = payment_worker
            .process_batch(batch_limit)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        tracing::info!(
            processed = outcome.processed,
            submitted = outcome.submitted,
            confirmed = outcome.confirmed,
            failed = outcome.failed,
            "settlement batch complete"
        );
        return Ok(());
    }

    worker::run_worker(payment_worker, config.worker_interval_secs, batch_limit).await;
    Ok(())
}

fn check_config() -> Result<()> {
    let config = Config::from_env()?;
    println!("configuration OK");
    println!("  live execution:   {}", config.payouts.live_execution);
    println!("  hot-key signing:  {}", config.payouts.sign_with_hot_key);
    println!("  source account:   {}", config.payouts.source_account);
    println!("  contract:         {}", config.payouts.payout_contract_id);
    println!("  rpc endpoint:     {}", config.payouts.soroban_rpc_url);
    println!("  max fee stroops:  {}", config.payouts.max_fee_stroops);
    println!("  max attempts:     {}", config.payouts.max_attempts);
    Ok(())
}

async fn create_pool(config: &Config) -> Result<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?)
}

/// The hot signer secret may come from the environment or, when an AppRole
/// is configured, from Vault.
async fn resolve_hot_signer_secret(config: &mut Config) -> Result<()> {
    if config.payouts.hot_signer_secret.is_none() && std::env::var("VAULT_ROLE_ID").is_ok() {
        let secrets = SecretsManager::new().await?;
        config.payouts.hot_signer_secret = Some(secrets.get_hot_signer_secret().await?);
        tracing::info!("hot signer secret loaded from Vault");
    }
    Ok(())
}

fn build_state(config: &Config, pool: PgPool) -> (AppState, PaymentWorker) {
    let transactions: Arc<dyn payout_core::ports::TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let admin_store: Arc<dyn payout_core::ports::AdminStore> =
        Arc::new(PostgresAdminStore::new(pool));

    let rpc = Arc::new(SorobanRpcClient::new(config.payouts.soroban_rpc_url.clone()));
    let payments = Arc::new(PaymentService::new(
        transactions.clone(),
        rpc,
        config.payouts.clone(),
    ));
    let admin = Arc::new(AdminService::new(
        admin_store.clone(),
        transactions.clone(),
        payments.clone(),
        config.payouts.admin_token_ttl_secs,
    ));

    let payment_worker = PaymentWorker::new(transactions.clone(), payments.clone());

    (
        AppState {
            transactions,
            admin_store,
            payments,
            admin,
        },
        payment_worker,
    )
}
