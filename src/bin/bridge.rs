//! `candle-bridge`: serves `/health` and `/candles` over the broker SDK.

use std::sync::Arc;

use candle_desk::LiveDataError;
use candle_desk::bridge::{BridgeState, router};
use candle_desk::config::fetch_bridge_config;
use candle_desk::credentials::populate_env_from_keychain;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), LiveDataError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Before the runtime spawns worker threads.
    populate_env_from_keychain();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| LiveDataError::Config(format!("failed to start runtime: {e}")))?
        .block_on(run())
}

async fn run() -> Result<(), LiveDataError> {
    let config = fetch_bridge_config()?;
    let state = Arc::new(BridgeState::from_config(&config)?);

    let addr = format!("{}:{}", config.bridge.host, config.bridge.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LiveDataError::Config(format!("cannot listen on {addr}: {e}")))?;
    info!(%addr, account_id = state.sdk.config().account_id, "Bridge listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down bridge");
        })
        .await
        .map_err(|e| LiveDataError::transport(format!("bridge server failed: {e}")))
}
