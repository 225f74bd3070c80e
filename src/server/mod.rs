//! HTTP server exposing the backup API
//!
//! Config, trigger, history, and cron endpoints for the DatoCMS plugin UI
//! and the external cron caller.

pub mod auth;
pub mod routes;
pub mod state;

pub use state::ServerAppState;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::models::HealthResponse;

/// Run the HTTP server until shutdown
pub async fn run_server(
    port: u16,
    bind: &str,
    state: ServerAppState,
    cors_origins: Option<Vec<String>>,
) -> Result<(), String> {
    // CORS must be the outermost layer so preflight OPTIONS requests are
    // answered before any auth check. Explicit headers rather than Any,
    // because browsers reject wildcard headers combined with Authorization.
    let cors = match &cors_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<HeaderValue> =
                origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods(Any)
                .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]),
    };

    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/config",
            get(routes::config_routes::get_config)
                .put(routes::config_routes::put_config)
                .delete(routes::config_routes::delete_config),
        )
        .route(
            "/api/backup/trigger",
            post(routes::backup_routes::trigger_backup),
        )
        .route(
            "/api/backup/history",
            get(routes::backup_routes::backup_history),
        )
        .route("/api/cron/backup", get(routes::cron_routes::cron_backup))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    log::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    log::info!("Shutdown signal received, stopping server...");
}

/// Health check: reports storage reachability without requiring auth
async fn health_handler(
    axum::extract::State(state): axum::extract::State<ServerAppState>,
) -> Json<HealthResponse> {
    let storage_connected = state.storage.is_reachable();
    Json(HealthResponse {
        status: if storage_connected {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage_connected,
        timestamp: Utc::now(),
    })
}
