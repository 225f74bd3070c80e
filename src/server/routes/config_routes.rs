//! /api/config handlers
//!
//! GET returns the stored config with the token masked. PUT upserts: it
//! merges partial updates over the existing config (or the defaults on
//! first create) and registers the project in the active set so the sweep
//! picks it up. DELETE requires the project's own token and unregisters it.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use super::{error_response, ProjectQuery};
use crate::models::{
    default_schedules, BackupConfig, GetConfigResponse, ProjectRegistration, UpdateConfigRequest,
    UpdateConfigResponse,
};
use crate::server::auth::verify_project_token;
use crate::server::state::ServerAppState;
use crate::validation::{is_valid_api_token_format, is_valid_project_id};

pub async fn get_config(
    State(state): State<ServerAppState>,
    Query(query): Query<ProjectQuery>,
) -> Response {
    if !is_valid_project_id(&query.project_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid project ID");
    }

    match state.storage.get_config(&query.project_id) {
        Ok(config) => Json(GetConfigResponse {
            config: config.map(|c| c.masked()),
        })
        .into_response(),
        Err(e) => {
            log::error!("Failed to load config for {}: {}", query.project_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load config")
        }
    }
}

pub async fn put_config(
    State(state): State<ServerAppState>,
    Json(request): Json<UpdateConfigRequest>,
) -> Response {
    if !is_valid_project_id(&request.project_id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid project ID");
    }
    if !is_valid_api_token_format(&request.api_token) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid API token format");
    }

    let existing = match state.storage.get_config(&request.project_id) {
        Ok(existing) => existing,
        Err(e) => {
            log::error!("Failed to load config for {}: {}", request.project_id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load config");
        }
    };
    let is_new = existing.is_none();

    let now = Utc::now();
    let updates = request.config.unwrap_or_default();
    let config = match existing {
        Some(current) => BackupConfig {
            project_id: current.project_id,
            api_token: request.api_token,
            source_environment: updates
                .source_environment
                .unwrap_or(current.source_environment),
            schedules: updates.schedules.unwrap_or(current.schedules),
            notifications: updates.notifications.or(current.notifications),
            created_at: current.created_at,
            updated_at: now,
        },
        None => BackupConfig {
            project_id: request.project_id.clone(),
            api_token: request.api_token,
            source_environment: updates
                .source_environment
                .unwrap_or_else(|| "main".to_string()),
            schedules: updates.schedules.unwrap_or_else(default_schedules),
            notifications: updates.notifications,
            created_at: now,
            updated_at: now,
        },
    };

    if let Err(e) = state.storage.set_config(&config) {
        log::error!("Failed to save config for {}: {}", config.project_id, e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save config");
    }

    // Membership in the active set drives the sweep
    let membership = if is_new {
        state.storage.register_project(&ProjectRegistration {
            project_id: config.project_id.clone(),
            site_name: config.project_id.clone(),
            registered_at: now,
            last_active_at: now,
        })
    } else {
        state.storage.touch_project(&config.project_id)
    };
    if let Err(e) = membership {
        log::warn!(
            "Failed to update registration for {}: {}",
            config.project_id,
            e
        );
    }

    Json(UpdateConfigResponse {
        success: true,
        config: config.masked(),
    })
    .into_response()
}

pub async fn delete_config(
    State(state): State<ServerAppState>,
    headers: HeaderMap,
    Query(query): Query<ProjectQuery>,
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

    if let Err(e) = state.storage.delete_config(&query.project_id) {
        log::error!("Failed to delete config for {}: {}", query.project_id, e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete config");
    }
    if let Err(e) = state.storage.unregister_project(&query.project_id) {
        log::warn!("Failed to unregister project {}: {}", query.project_id, e);
    }

    Json(serde_json::json!({ "success": true })).into_response()
}
