// Run one payment sync pass outside the server.
// Usage: cargo run --bin reconcile -- --merchant <uuid>
//        cargo run --bin reconcile -- --all

use clap::Parser;
use std::sync::Arc;

use verdustock_api::config::Config;
use verdustock_api::database;
use verdustock_api::services::{MercadoPagoClient, ReconciliationEngine};

/// Pull recent approved payments from the provider and reconcile them into sales.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Merchant to sync.
    #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
    merchant: Option<uuid::Uuid>,

    /// Sync every merchant with a linked payment account.
    #[arg(short, long)]
    all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verdustock_api=info,reconcile=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let store = database::open_store(&config).await?;
    let gateway = Arc::new(MercadoPagoClient::new(&config.gateway)?);
    let engine = ReconciliationEngine::new(
        store,
        gateway,
        config.policy.clone(),
        config.webhook_resolution,
        config.gateway.clone(),
    );

    match args.merchant {
        Some(merchant) => {
            let report = engine.sync_merchant(merchant).await?;
            println!(
                "Merchant {}: {} fetched, {} new, {} already reconciled, {} skipped",
                merchant, report.fetched, report.recorded, report.duplicates, report.skipped
            );
        }
        None => {
            let sweep = engine.sync_all().await?;
            println!(
                "{} merchants synced ({} failed), {} new payments",
                sweep.merchants, sweep.failed, sweep.recorded
            );
            if sweep.failed > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
