//! LENDBOT: automated peer-lending investor.
//!
//! Entry point. Loads configuration, initialises structured logging, and
//! runs exactly one flow (invest, withdraw or notify) before exiting.
//! Any failure is logged at error level and ends the process with a
//! non-zero status. Each flow logs its own failures.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use lendbot::config::{AppConfig, DEFAULT_CONFIG_PATH};
use lendbot::engine::{BalanceAlert, InvestmentPipeline, WithdrawalRun};
use lendbot::http::{HttpTransport, ReqwestTransport};
use lendbot::marketplace::{MarketplaceClient, RateLimiter};
use lendbot::notify::MailgunClient;

#[derive(Parser, Debug)]
#[command(name = "lendbot", version, about = "Automated peer-lending investor")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "LENDBOT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Buy notes in newly listed loans that pass the policy filters
    Invest,
    /// Move idle cash out of the account
    Withdraw,
    /// Mail the current balance if it is high enough
    Notify,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config)
        .inspect_err(|e| error!(error = %format!("{e:#}"), "Failed to load configuration"))?;
    cfg.validate()
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let credentials = cfg
        .marketplace_credentials()
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;

    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::new()
            .inspect_err(|e| error!(error = %format!("{e:#}"), "Failed to build HTTP transport"))?,
    );
    let limiter = RateLimiter::new(cfg.marketplace.throttle());
    let client = MarketplaceClient::new(
        Arc::clone(&transport),
        limiter,
        &cfg.marketplace.base_url,
        &cfg.marketplace.api_version,
        credentials,
    );

    info!(
        command = ?cli.command,
        config = %cli.config,
        throttle_ms = cfg.marketplace.throttle_ms,
        "LENDBOT starting"
    );

    match cli.command {
        Command::Invest => {
            let run = InvestmentPipeline::new(&client, &cfg.policy).run().await;
            run.result?;
        }
        Command::Withdraw => {
            WithdrawalRun::new(&client, &cfg.withdrawal).run().await?;
        }
        Command::Notify => {
            let (settings, mail) = cfg
                .notification()
                .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
            let mailer = MailgunClient::new(transport, mail);
            BalanceAlert::new(&client, &mailer, &settings).run().await?;
        }
    }

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lendbot=info"));

    if std::env::var("LENDBOT_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
