//! Bearer token extraction and timing-safe verification
//!
//! Two callers, two secrets: the cron endpoint checks the shared cron
//! secret, while project routes check the caller's token against the one
//! stored in the project's config. Both comparisons go through
//! [`secure_compare`] so response timing leaks nothing about the secret.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::crypto::secure_compare;

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

/// Does the request carry the cron secret?
pub fn verify_cron_secret(headers: &HeaderMap, cron_secret: &str) -> bool {
    match bearer_token(headers) {
        Some(token) => secure_compare(&token, cron_secret),
        None => false,
    }
}

/// Does the request carry the project's own API token?
pub fn verify_project_token(headers: &HeaderMap, stored_token: &str) -> bool {
    match bearer_token(headers) {
        Some(token) => secure_compare(&token, stored_token),
        None => false,
    }
}
