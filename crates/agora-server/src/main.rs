//! # agora-server
//!
//! Content proxy for the Agora web client.
//!
//! Browsers cannot call the upstream content backend directly (no CORS
//! headers there), so this binary forwards the read-only directory
//! endpoints and answers with permissive CORS:
//! - `GET /api/content` for content library items
//! - `GET /api/action-hub` for the organization directory
//! - `GET /api/map` for community map pins
//! - `GET /health` as a liveness probe

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ProxyConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agora_server=debug")),
        )
        .init();

    info!("Starting Agora content proxy v{}", env!("CARGO_PKG_VERSION"));

    let config = ProxyConfig::from_env();
    info!(
        upstream = %config.upstream_url,
        production = config.production,
        "Loaded configuration"
    );

    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()?;

    let http_addr = config.http_addr;
    let state = AppState {
        http,
        config: Arc::new(config),
    };

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
