use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use boxoffice_server::checkout::HoldSweeper;
use boxoffice_server::config::{Config, PaymentConfig};
use boxoffice_server::payment::{MockPaymentProcessor, PaymentProcessor, StripeClient};
use boxoffice_server::routes::create_routes;
use boxoffice_server::state::AppState;
use boxoffice_server::store::{MemoryTicketStore, PgTicketStore, TicketStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let store: Arc<dyn TicketStore> = match &config.database_url {
        Some(database_url) => {
            let store = PgTicketStore::connect(database_url, config.max_connections)
                .await
                .expect("Failed to connect to database");

            store.migrate().await.expect("Failed to run migrations");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryTicketStore::new())
        }
    };

    let processor: Arc<dyn PaymentProcessor> = match &config.payment {
        PaymentConfig::Stripe {
            secret_key,
            api_base,
        } => Arc::new(
            StripeClient::new(secret_key.clone(), api_base.clone())
                .expect("Failed to build payment client"),
        ),
        PaymentConfig::Mock => {
            tracing::warn!("Using the mock payment processor");
            MockPaymentProcessor::shared()
        }
    };

    let sweeper = HoldSweeper::from_config(store.clone(), &config)
        .spawn(Duration::from_secs(config.hold_sweep_interval_secs));

    let state = AppState::new(store, processor, &config);
    let app: Router = create_routes(state, &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
    sweeper.abort();
}
