use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ProxyConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub http: reqwest::Client,
    pub config: Arc<ProxyConfig>,
}

impl AppState {
    fn upstream_error(&self, message: &str, details: String) -> ServerError {
        warn!(error = %details, "Proxy upstream error");
        ServerError::Upstream {
            message: message.to_string(),
            details: (!self.config.production).then_some(details),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/content", get(proxy_content))
        .route("/api/action-hub", get(proxy_action_hub))
        .route("/api/map", get(proxy_map))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn proxy_content(State(state): State<AppState>) -> Result<Response, ServerError> {
    forward(&state, "/api/content", "Failed to fetch content").await
}

async fn proxy_action_hub(State(state): State<AppState>) -> Result<Response, ServerError> {
    forward(&state, "/api/action-hub", "Failed to fetch action hub data").await
}

async fn proxy_map(State(state): State<AppState>) -> Result<Response, ServerError> {
    forward(&state, "/api/map", "Failed to fetch map data").await
}

/// Forward a GET to the upstream backend and relay its JSON body as-is.
/// Any upstream failure becomes a single opaque envelope; no partial data
/// is returned.
async fn forward(state: &AppState, path: &str, message: &str) -> Result<Response, ServerError> {
    let url = format!("{}{}", state.config.upstream_url.trim_end_matches('/'), path);

    let response = state
        .http
        .get(&url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| state.upstream_error(message, e.to_string()))?;

    if !response.status().is_success() {
        return Err(state.upstream_error(
            message,
            format!("upstream responded with {}", response.status()),
        ));
    }

    let body = response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| state.upstream_error(message, e.to_string()))?;

    Ok(Json(body).into_response())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting content proxy");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
