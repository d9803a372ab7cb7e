// Library root - exports for the server binary, the reconcile tool and tests

pub mod background;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use database::SharedStore;
use services::{BoxAggregator, PaymentGateway, ReconciliationEngine, SaleLedger};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub ledger: Arc<SaleLedger>,
    pub boxes: Arc<BoxAggregator>,
    pub reconciler: Arc<ReconciliationEngine>,
}

impl AppState {
    /// Wire every service to one store and one gateway client.
    pub fn new(config: Arc<Config>, store: SharedStore, gateway: Arc<dyn PaymentGateway>) -> Self {
        let ledger = SaleLedger::new(store.clone(), config.calendar);
        let boxes = BoxAggregator::new(store.clone(), config.calendar);
        let reconciler = ReconciliationEngine::new(
            store.clone(),
            gateway,
            config.policy.clone(),
            config.webhook_resolution,
            config.gateway.clone(),
        );

        Self {
            config,
            store,
            ledger: Arc::new(ledger),
            boxes: Arc::new(boxes),
            reconciler: Arc::new(reconciler),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/sales", get(handlers::list_sales).post(handlers::create_sale))
        .route("/api/sales/close", post(handlers::close_box))
        .route("/api/sales/:id", put(handlers::update_sale))
        .route("/api/cash/pending", get(handlers::pending_boxes))
        .route("/api/payments", get(handlers::list_payments))
        .route("/api/payments/sync", post(handlers::sync_payments))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/webhooks/mercadopago", post(handlers::payment_webhook))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
