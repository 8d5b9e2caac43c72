use eyre::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use elastic_arbitrage::adapters::database::Database;
use elastic_arbitrage::api;
use elastic_arbitrage::config::Config;
use elastic_arbitrage::engine::host::ContractHost;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elastic_arbitrage=info,tower_http=info".into()),
        )
        .init();

    let config = Config::load()?;
    info!("Deploying {} with admin {}", config.contract_name, config.admin);

    let db = Database::new(&config.db_path).await?;
    info!("Receipt store opened at {}", config.db_path);

    let host = ContractHost::open(db, config.admin.clone()).await?;

    let app_state = Arc::new(api::AppState {
        host,
        contract_name: config.contract_name.clone(),
        start_time: Instant::now(),
    });
    let app = api::router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.api_port)).await?;
    info!("Call API running on http://0.0.0.0:{}", config.api_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Node shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
