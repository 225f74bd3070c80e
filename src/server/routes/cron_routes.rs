//! /api/cron/backup handler: the scheduled sweep entry point
//!
//! Gated by the shared cron secret. Per-project failures are reported inside
//! the structured response; only a failure to enumerate projects yields 500.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::error_response;
use crate::server::auth::verify_cron_secret;
use crate::server::state::ServerAppState;
use crate::sweep::run_scheduled_sweep;

pub async fn cron_backup(State(state): State<ServerAppState>, headers: HeaderMap) -> Response {
    if state.cron_secret.is_empty() {
        log::error!("CRON_SECRET is not configured; rejecting cron request");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error",
        );
    }
    if !verify_cron_secret(&headers, &state.cron_secret) {
        log::warn!("Rejected cron request with missing or invalid secret");
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    match run_scheduled_sweep(&state.storage, state.cms.as_ref()).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            log::error!("Sweep failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Backup sweep failed")
        }
    }
}
