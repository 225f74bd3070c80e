//! Input validation and sanitization for HTTP parameters
//!
//! Everything arriving from query strings or request bodies passes through
//! here before touching storage or the CMS API.

use crate::models::{BackupStatus, BackupType};

pub const MAX_LIMIT: usize = 100;
pub const MAX_OFFSET: usize = 10_000;
pub const MAX_PREFIX_LENGTH: usize = 50;
pub const MAX_NOTE_LENGTH: usize = 500;

/// Clamp a pagination limit, falling back to the default on bad input
pub fn validate_limit(value: Option<&str>, default: usize) -> usize {
    match value.and_then(|v| v.parse::<usize>().ok()) {
        Some(parsed) if parsed >= 1 => parsed.min(MAX_LIMIT),
        _ => default,
    }
}

/// Clamp a pagination offset, falling back to the default on bad input
pub fn validate_offset(value: Option<&str>, default: usize) -> usize {
    match value.and_then(|v| v.parse::<usize>().ok()) {
        Some(parsed) => parsed.min(MAX_OFFSET),
        None => default,
    }
}

/// Parse a backup-type filter; unknown values are dropped rather than erroring
pub fn validate_backup_type(value: Option<&str>) -> Option<BackupType> {
    value.and_then(BackupType::parse)
}

/// Parse a status filter; unknown values are dropped rather than erroring
pub fn validate_status(value: Option<&str>) -> Option<BackupStatus> {
    match value? {
        "pending" => Some(BackupStatus::Pending),
        "in_progress" => Some(BackupStatus::InProgress),
        "completed" => Some(BackupStatus::Completed),
        "failed" => Some(BackupStatus::Failed),
        "cleaned" => Some(BackupStatus::Cleaned),
        _ => None,
    }
}

/// Sanitize an environment prefix to lowercase alphanumerics and hyphens
///
/// The prefix becomes part of an environment id on the CMS, so anything else
/// is replaced, runs of hyphens are collapsed, and edges are trimmed.
pub fn validate_environment_prefix(value: Option<&str>) -> Option<String> {
    let raw = value?;

    let mut sanitized = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            sanitized.push(c);
        } else {
            sanitized.push('-');
        }
    }

    // Collapse hyphen runs and trim edges
    let mut collapsed = String::with_capacity(sanitized.len());
    for c in sanitized.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }
    let trimmed: String = collapsed
        .trim_matches('-')
        .chars()
        .take(MAX_PREFIX_LENGTH)
        .collect();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Trim and length-limit a free-form note
pub fn validate_note(value: Option<&str>) -> Option<String> {
    let trimmed: String = value?.trim().chars().take(MAX_NOTE_LENGTH).collect();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Project ids are short alphanumeric identifiers
pub fn is_valid_project_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 50
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// API tokens are 20+ characters, alphanumeric with optional colons
pub fn is_valid_api_token_format(value: &str) -> bool {
    value.len() >= 20 && value.chars().all(|c| c.is_ascii_alphanumeric() || c == ':')
}
