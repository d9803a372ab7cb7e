use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use verdustock_api::background::BackgroundScheduler;
use verdustock_api::services::MercadoPagoClient;
use verdustock_api::{database, router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing (LOG_FORMAT=json for structured output)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "verdustock_api=debug,tower_http=debug".into());
    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Verdustock API server...");

    let config = Arc::new(Config::from_env()?);
    info!("Configuration loaded");

    let store = database::open_store(&config).await?;

    let gateway = Arc::new(MercadoPagoClient::new(&config.gateway)?);
    let app_state = AppState::new(config.clone(), store, gateway);

    // Periodic pull is optional; the webhook covers the normal path.
    let scheduler = match &config.sync_cron {
        Some(cron) => Some(BackgroundScheduler::new(cron, app_state.reconciler.clone()).await?),
        None => {
            info!("SYNC_CRON not set, periodic payment sync disabled");
            None
        }
    };

    let app = router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Graceful shutdown
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down gracefully...");
            if let Some(scheduler) = &scheduler {
                scheduler.shutdown().await;
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
