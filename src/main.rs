// src/main.rs
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use truck_dispatch::api;
use truck_dispatch::config::AppConfig;
use truck_dispatch::depot::Depot;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let dotenv_result = dotenvy::dotenv();
    init_tracing();

    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("⚠️ Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let allocation_config = app_config.allocator.allocation_config();

    info!(
        threshold = %allocation_config.threshold(),
        strategy = allocation_config.default_strategy().code(),
        "🚚 Dispatch service starting..."
    );
    let depot = Arc::new(Depot::new(allocation_config));
    api::start_api_server(app_config.api, depot).await
}
