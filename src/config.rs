use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

pub const DEFAULT_NETWORK_PASSPHRASE: &str = "Test SDF Network ; September 2015";
pub const DEFAULT_SOROBAN_RPC_URL: &str = "https://soroban-testnet.stellar.org";
pub const DEFAULT_PAYOUT_METHOD_NAME: &str = "distribute_winnings";

/// Settlement pipeline settings. Read once at startup, immutable afterwards.
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// When false the engine only ever builds transactions (dry-run mode).
    pub live_execution: bool,
    /// Sign freshly-built transactions with the hot key instead of waiting
    /// for an external signer.
    pub sign_with_hot_key: bool,
    pub max_fee_stroops: i64,
    pub max_attempts: i32,
    pub confirm_poll_ms: u64,
    pub confirm_max_polls: u32,
    pub payout_contract_id: String,
    pub payout_method_name: String,
    pub source_account: String,
    pub hot_signer_secret: Option<String>,
    pub network_passphrase: String,
    pub soroban_rpc_url: String,
    pub admin_token_ttl_secs: i64,
}

/// Process-level settings for the server and worker binaries.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub worker_batch_limit: i64,
    pub worker_interval_secs: u64,
    pub payouts: PayoutConfig,
}

impl PayoutConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = PayoutConfig {
            live_execution: bool_flag("PAYOUTS_LIVE_EXECUTION"),
            sign_with_hot_key: bool_flag("PAYOUTS_SIGN_WITH_HOT_KEY"),
            max_fee_stroops: parsed_or("PAYOUTS_MAX_FEE_STROOPS", 2_000_000)?,
            max_attempts: parsed_or("PAYOUTS_MAX_ATTEMPTS", 5)?,
            confirm_poll_ms: parsed_or("PAYOUTS_CONFIRM_POLL_MS", 2_500)?,
            confirm_max_polls: parsed_or("PAYOUTS_CONFIRM_MAX_POLLS", 20)?,
            payout_contract_id: env::var("PAYOUT_CONTRACT_ID")
                .context("PAYOUT_CONTRACT_ID is required")?,
            payout_method_name: env::var("PAYOUT_METHOD_NAME")
                .unwrap_or_else(|_| DEFAULT_PAYOUT_METHOD_NAME.to_string()),
            source_account: env::var("PAYOUT_SOURCE_ACCOUNT")
                .context("PAYOUT_SOURCE_ACCOUNT is required")?,
            hot_signer_secret: env::var("PAYOUT_HOT_SIGNER_SECRET").ok(),
            network_passphrase: env::var("STELLAR_NETWORK_PASSPHRASE")
                .unwrap_or_else(|_| DEFAULT_NETWORK_PASSPHRASE.to_string()),
            soroban_rpc_url: env::var("SOROBAN_RPC_URL")
                .unwrap_or_else(|_| DEFAULT_SOROBAN_RPC_URL.to_string()),
            admin_token_ttl_secs: parsed_or("ADMIN_TOKEN_TTL_SECONDS", 900)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.payout_contract_id.len() < 3 {
            anyhow::bail!("PAYOUT_CONTRACT_ID is too short");
        }
        if self.source_account.len() < 3 {
            anyhow::bail!("PAYOUT_SOURCE_ACCOUNT is too short");
        }
        if self.network_passphrase.len() < 3 {
            anyhow::bail!("STELLAR_NETWORK_PASSPHRASE is too short");
        }
        if self.max_fee_stroops <= 0 {
            anyhow::bail!("PAYOUTS_MAX_FEE_STROOPS must be positive");
        }
        if self.max_attempts <= 0 {
            anyhow::bail!("PAYOUTS_MAX_ATTEMPTS must be positive");
        }
        if self.confirm_poll_ms == 0 {
            anyhow::bail!("PAYOUTS_CONFIRM_POLL_MS must be positive");
        }
        if self.confirm_max_polls == 0 {
            anyhow::bail!("PAYOUTS_CONFIRM_MAX_POLLS must be positive");
        }
        if self.admin_token_ttl_secs <= 0 {
            anyhow::bail!("ADMIN_TOKEN_TTL_SECONDS must be positive");
        }
        url::Url::parse(&self.soroban_rpc_url).context("SOROBAN_RPC_URL is not a valid URL")?;
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Config {
            server_port: parsed_or("SERVER_PORT", 3000)?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            redis_url: env::var("REDIS_URL").ok(),
            worker_batch_limit: parsed_or("WORKER_BATCH_LIMIT", 25)?,
            worker_interval_secs: parsed_or("WORKER_INTERVAL_SECS", 5)?,
            payouts: PayoutConfig::from_env()?,
        })
    }
}

/// Boolean env flags accept "true" or "1"; everything else (including
/// absence) is false.
fn bool_flag(name: &str) -> bool {
    matches!(env::var(name).as_deref(), Ok("true") | Ok("1"))
}

fn parsed_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} is not a valid value", name)),
        Err(_) => Ok(default),
    }
}
