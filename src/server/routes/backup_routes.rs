//! /api/backup handlers: manual triggers and run history
//!
//! Both require the project's stored API token as a bearer credential.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::error_response;
use crate::models::{BackupType, HistoryResponse, TriggerBackupRequest};
use crate::server::auth::verify_project_token;
use crate::server::state::ServerAppState;
use crate::sweep;
use crate::validation::{
    is_valid_project_id, validate_backup_type, validate_environment_prefix, validate_limit,
    validate_note, validate_offset, validate_status,
};

const DEFAULT_HISTORY_LIMIT: usize = 50;

pub async fn trigger_backup(
    State(state): State<ServerAppState>,
    headers: HeaderMap,
    Json(request): Json<TriggerBackupRequest>,
) -> Response {
    if !is_valid_project_id(&request.project_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid project ID");
    }

    let config = match state.storage.get_config(&request.project_id) {
        Ok(Some(config)) => config,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "No configuration found"),
        Err(e) => {
            log::error!("Failed to load config for {}: {}", request.project_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load config");
        }
    };

    if !verify_project_token(&headers, &config.api_token) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let backup_type = request.backup_type.unwrap_or(BackupType::Manual);
    let options = request.options.unwrap_or_default();
    let prefix = validate_environment_prefix(options.environment_prefix.as_deref());
    let note = validate_note(options.note.as_deref());

    match sweep::trigger_backup(&state.storage, state.cms.as_ref(), &config, backup_type, prefix, note)
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            log::error!("Backup trigger failed for {}: {}", request.project_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to trigger backup")
        }
    }
}

/// Query parameters for GET /api/backup/history
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub project_id: String,
    pub limit: Option<String>,
    pub offset: Option<String>,
    #[serde(rename = "type")]
    pub backup_type: Option<String>,
    pub status: Option<String>,
}

pub async fn backup_history(
    State(state): State<ServerAppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if !is_valid_project_id(&query.project_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid project ID");
    }

    let config = match state.storage.get_config(&query.project_id) {
        Ok(Some(config)) => config,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "No configuration found"),
        Err(e) => {
            log::error!("Failed to load config for {}: {}", query.project_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load config");
        }
    };

    if !verify_project_token(&headers, &config.api_token) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let limit = validate_limit(query.limit.as_deref(), DEFAULT_HISTORY_LIMIT);
    let offset = validate_offset(query.offset.as_deref(), 0);
    let type_filter = validate_backup_type(query.backup_type.as_deref());
    let status_filter = validate_status(query.status.as_deref());

    let response = if type_filter.is_none() && status_filter.is_none() {
        match state.storage.run_history(&query.project_id, limit, offset) {
            Ok((runs, total)) => {
                let has_more = offset + runs.len() < total;
                HistoryResponse {
                    runs,
                    total,
                    has_more,
                }
            }
            Err(e) => {
                log::error!("Failed to load history for {}: {}", query.project_id, e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load history");
            }
        }
    } else {
        // Filters change the population, so page after filtering
        match state
            .storage
            .run_history(&query.project_id, usize::MAX, 0)
        {
            Ok((runs, _)) => {
                let filtered: Vec<_> = runs
                    .into_iter()
                    .filter(|run| type_filter.is_none_or(|t| run.backup_type == t))
                    .filter(|run| status_filter.is_none_or(|s| run.status == s))
                    .collect();
                let total = filtered.len();
                let page: Vec<_> = filtered.into_iter().skip(offset).take(limit).collect();
                let has_more = offset + page.len() < total;
                HistoryResponse {
                    runs: page,
                    total,
                    has_more,
                }
            }
            Err(e) => {
                log::error!("Failed to load history for {}: {}", query.project_id, e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load history");
            }
        }
    };

    Json(response).into_response()
}
