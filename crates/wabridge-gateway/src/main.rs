use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use wabridge_core::config::AppConfig;
use wabridge_store::Store;

mod app;
mod http;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wabridge_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > WABRIDGE_CONFIG env > ~/.wabridge/wabridge.toml
    let config_path = std::env::var("WABRIDGE_CONFIG").ok();
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let store = Arc::new(Store::open(&config.database.path)?);

    let state = Arc::new(app::AppState::new(config, store));
    wabridge_media::spawn_sweeper(state.media.clone());
    wabridge_buffer::spawn_sweeper(state.buffer.clone());

    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("wabridge gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
