use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swaptrader::api::{JupiterClient, MarketGateway};
use swaptrader::config::{AppConfig, RetryPolicy};
use swaptrader::db::PostgresPersistence;
use swaptrader::execution::{PositionLifecycleManager, TradingEngine, TransactionExecutor};
use swaptrader::persistence::RedisPersistence;
use swaptrader::wallet::{SolanaRpcWallet, TransactionSigner, WalletGateway};
use swaptrader::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swaptrader", version, about = "EMA/RSI swap trading loop for Solana pairs")]
struct Cli {
    /// Config file (defaults to ./swaptrader.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the trading loop until Ctrl+C
    Run,
    /// Run a single tick and exit
    Once,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    setup_logging(&config.log_filter);

    match cli.command.unwrap_or(Command::Run) {
        Command::Migrate => {
            PostgresPersistence::new(&config.database_url).await?;
            tracing::info!("✅ Migrations applied");
        }
        Command::Once => {
            let engine = build_engine(&config).await?;
            let summary = engine.run_tick().await;
            tracing::info!(
                "✅ Tick complete: {} pairs, {} prices stored, {} buys, {} sells",
                summary.pairs,
                summary.prices_stored,
                summary.buys,
                summary.sells
            );
        }
        Command::Run => {
            tracing::info!("🚀 swaptrader starting");
            let engine = build_engine(&config).await?;
            tracing::info!("Press Ctrl+C to stop...");

            engine.run(shutdown_signal()).await;

            tracing::info!("👋 swaptrader stopped");
        }
    }

    Ok(())
}

// ============================================================================
// Initialization
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn build_engine(config: &AppConfig) -> Result<TradingEngine> {
    let postgres = Arc::new(PostgresPersistence::new(&config.database_url).await?);
    let redis = Arc::new(RedisPersistence::new(&config.redis_url).await?);

    let market: Arc<dyn MarketGateway> = Arc::new(JupiterClient::new(
        config.jupiter_api_url.clone(),
        config.jupiter_requests_per_minute,
        config.slippage_bps,
        RetryPolicy::default(),
    )?);

    let lifecycle = match &config.wallet_private_key {
        Some(secret) => {
            let signer = TransactionSigner::from_base58(secret)?;
            let wallet = SolanaRpcWallet::new(
                config.solana_rpc_url.clone(),
                signer,
                config.rpc_retry.clone(),
            )?;
            tracing::info!("🔑 Trading wallet {}", wallet.public_key());

            let executor = TransactionExecutor::new(market.clone(), Arc::new(wallet), config.market_fee);
            Some(PositionLifecycleManager::new(postgres.clone(), redis.clone(), executor))
        }
        None => {
            tracing::warn!("No wallet_private_key configured: running read-only, signals are logged only");
            None
        }
    };

    tracing::info!("📊 Configuration:");
    tracing::info!("  Tick interval: {}s", config.tick_interval_secs);
    tracing::info!("  Market fee: {}", config.market_fee);
    tracing::info!("  Slippage: {} bps", config.slippage_bps);
    tracing::info!("  Price retention: {}h", config.price_retention_hours);

    Ok(TradingEngine::new(postgres, redis.clone(), redis, market, lifecycle)
        .with_tick_interval(config.tick_interval())
        .with_price_retention(config.price_retention_hours))
}
