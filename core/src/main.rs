use anyhow::Result;
use axum::serve;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wealth_tracker_core::config::AppConfig;
use wealth_tracker_core::{create_router, initialize_backend};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    info!("Using data directory {}", config.data_directory.display());

    let app_state = initialize_backend(&config).await?;
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    info!("Starting server on {}", listener.local_addr()?);
    serve(listener, app).await?;

    Ok(())
}
