//! Route handlers, organized by API surface
//!
//! - config_routes: per-project configuration (GET/PUT/DELETE /api/config)
//! - backup_routes: manual triggers and run history
//! - cron_routes: the scheduled sweep entry point

pub mod backup_routes;
pub mod config_routes;
pub mod cron_routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::models::ApiError;

/// Query parameter carried by all per-project routes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuery {
    pub project_id: String,
}

/// Build an error response with the standard body shape
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(message))).into_response()
}
