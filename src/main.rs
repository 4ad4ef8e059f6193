use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod model;
mod routes;
mod services;
mod store;
#[cfg(test)]
mod test_support;

use crate::config::AppConfig;
use routes::orders::order_router;
use services::gateway::{HttpPaymentGateway, PaymentGateway};
use services::notify::MailNotifier;
use services::{Collaborators, Services};
use store::catalog::{PgCatalog, PgDirectory, PgLedger};
use store::postgres::{PgBookingStore, PgLegRequests};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;

    // Connect to PostgreSQL
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    if config.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        info!("migrations applied");
    }

    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(&config.gateway)?);
    let catalog = Arc::new(PgCatalog::new(pool.clone()));

    let services = Services::build(
        Collaborators {
            store: Arc::new(PgBookingStore::new(pool.clone())),
            legs: Arc::new(PgLegRequests::new(pool.clone())),
            assets: catalog.clone(),
            insurances: catalog,
            directory: Arc::new(PgDirectory::new(pool.clone(), gateway.clone())),
            ledger: Arc::new(PgLedger::new(pool.clone())),
            gateway,
            notifier: Arc::new(MailNotifier::new(config.mail.relay_url.clone())?),
        },
        &config,
    )?;

    let app = Router::new()
        // Order routes (booking, approval, payment callbacks)
        .merge(order_router())
        .route("/api/hello", get(|| async { "Hello from the rental backend!" }))
        .layer(Extension(services))
        .layer(TraceLayer::new_for_http())
        // Add CORS for frontend
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, timezone = %config.timezone, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
