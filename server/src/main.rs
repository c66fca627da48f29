use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventhub_server::config::Config;
use eventhub_server::gateway::midtrans::MidtransGateway;
use eventhub_server::gateway::{MockPaymentGateway, PaymentGateway};
use eventhub_server::notify::LogMailer;
use eventhub_server::routes::create_routes;
use eventhub_server::state::AppState;
use eventhub_server::store::PgStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Migrations run successfully");

    let gateway: Arc<dyn PaymentGateway> = match &config.payment.midtrans_server_key {
        Some(key) => {
            tracing::info!(base_url = %config.payment.midtrans_base_url, "Using Midtrans gateway");
            Arc::new(MidtransGateway::new(
                config.payment.midtrans_base_url.clone(),
                key.clone(),
            )?)
        }
        None => {
            tracing::warn!("MIDTRANS_SERVER_KEY not set, using the mock payment gateway");
            MockPaymentGateway::shared()
        }
    };

    let store = Arc::new(PgStore::new(pool, config.lock_timeout_ms));
    let state = AppState::new(store, gateway, Arc::new(LogMailer));

    let sweeper = state.sweeper().spawn(config.sweeper_interval);

    let app = create_routes(state, &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}
