//! Retention policy enforcement
//!
//! Each schedule type prunes its own environment population (scoped by name
//! prefix) down to `retention_count`, plus an age ceiling that removes
//! environments older than the type's max age even inside the kept window.
//! The primary environment is never deletable. Deletions are independent;
//! one failure never blocks the rest.

use chrono::{DateTime, Duration, Utc};

use crate::cms::{CmsBackend, Environment};
use crate::models::{max_backup_age_days, BackupConfig, BackupStatus, BackupType};
use crate::storage::Storage;

/// How many run-history entries to scan when labeling cleaned runs
const CLEANED_SCAN_WINDOW: usize = 100;

/// Outcome of retention for one backup type
#[derive(Debug, Clone)]
pub struct RetentionResult {
    pub backup_type: BackupType,
    pub deleted_environments: Vec<String>,
    pub deleted_runs: Vec<String>,
    pub errors: Vec<String>,
}

impl RetentionResult {
    fn empty(backup_type: BackupType) -> Self {
        Self {
            backup_type,
            deleted_environments: Vec::new(),
            deleted_runs: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Select environment ids due for deletion.
///
/// Considers only environments matching `prefix`, never the primary. The
/// newest `keep_count` survive unless `max_age_days` marks them too old.
pub fn select_for_deletion(
    environments: &[Environment],
    prefix: &str,
    keep_count: usize,
    max_age_days: Option<u32>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut candidates: Vec<&Environment> = environments
        .iter()
        .filter(|env| !env.primary && env.id.starts_with(prefix))
        .collect();
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let max_age = max_age_days.map(|days| Duration::days(i64::from(days)));

    candidates
        .iter()
        .enumerate()
        .filter(|(i, env)| {
            *i >= keep_count
                || max_age.is_some_and(|limit| now - env.created_at > limit)
        })
        .map(|(_, env)| env.id.clone())
        .collect()
}

/// Delete old backup environments on the CMS; returns (deleted, errors)
pub async fn cleanup_old_backups(
    cms: &dyn CmsBackend,
    api_token: &str,
    prefix: &str,
    keep_count: usize,
    max_age_days: Option<u32>,
) -> (Vec<String>, Vec<String>) {
    let environments = match cms.list_environments(api_token).await {
        Ok(environments) => environments,
        Err(e) => return (Vec::new(), vec![format!("Failed to list environments: {}", e)]),
    };

    let to_delete = select_for_deletion(&environments, prefix, keep_count, max_age_days, Utc::now());

    let mut deleted = Vec::new();
    let mut errors = Vec::new();

    for environment_id in to_delete {
        match cms.delete_environment(api_token, &environment_id).await {
            Ok(()) => deleted.push(environment_id),
            Err(e) => errors.push(format!("Failed to delete {}: {}", environment_id, e)),
        }
    }

    (deleted, errors)
}

/// Enforce the retention policy for one schedule type of a project.
///
/// Prunes CMS environments, labels completed runs whose environment was just
/// deleted as `cleaned`, and prunes the run ledger to `retention_count * 3`
/// so history stays browsable after environments are gone.
pub async fn enforce_retention(
    storage: &Storage,
    cms: &dyn CmsBackend,
    config: &BackupConfig,
    backup_type: BackupType,
) -> RetentionResult {
    let mut result = RetentionResult::empty(backup_type);

    let schedule = match config.schedules.get(backup_type) {
        Some(schedule) if schedule.enabled => schedule,
        _ => return result,
    };

    let (deleted, errors) = cleanup_old_backups(
        cms,
        &config.api_token,
        &schedule.prefix,
        schedule.retention_count,
        max_backup_age_days(backup_type),
    )
    .await;
    result.deleted_environments = deleted;
    result.errors = errors;

    if !result.deleted_environments.is_empty() {
        mark_cleaned_runs(storage, config, &result.deleted_environments, &mut result.errors);
    }

    // Keep more run records than environments for history
    match storage.delete_old_runs(&config.project_id, schedule.retention_count * 3) {
        Ok(deleted_runs) => result.deleted_runs = deleted_runs,
        Err(e) => result.errors.push(e),
    }

    result
}

/// Label completed runs whose target environment was deleted by retention
fn mark_cleaned_runs(
    storage: &Storage,
    config: &BackupConfig,
    deleted_environments: &[String],
    errors: &mut Vec<String>,
) {
    let (runs, _) = match storage.run_history(&config.project_id, CLEANED_SCAN_WINDOW, 0) {
        Ok(history) => history,
        Err(e) => {
            errors.push(e);
            return;
        }
    };

    for mut run in runs {
        if run.status == BackupStatus::Completed
            && deleted_environments.contains(&run.target_environment)
        {
            run.status = BackupStatus::Cleaned;
            if let Err(e) = storage.update_run(&run) {
                errors.push(format!("Failed to mark run {} cleaned: {}", run.id, e));
            }
        }
    }
}
