//! Backup orchestration: the periodic sweep and manual triggers
//!
//! A sweep walks every active project in sequence, services at most one due
//! backup per project, then enforces retention. Per-project failures become
//! error entries in the sweep result; nothing aborts the remaining projects.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cms::{create_backup, CmsBackend};
use crate::models::{
    BackupConfig, BackupRun, BackupRunMetadata, BackupStatus, BackupType, SweepOutcome,
    SweepOutcomeStatus, SweepResponse, TriggerBackupResponse, TriggerSource,
};
use crate::retention::enforce_retention;
use crate::scheduler::{generate_backup_environment_id, next_due_backup};
use crate::storage::Storage;

/// How many recent runs to scan for last-trigger timestamps
const HISTORY_WINDOW: usize = 100;

/// Run one sweep across all active projects.
///
/// Errs only when the active-project set itself cannot be read; everything
/// past that point is collected into the response.
pub async fn run_scheduled_sweep(
    storage: &Storage,
    cms: &dyn CmsBackend,
) -> Result<SweepResponse, String> {
    let timestamp = Utc::now();
    let mut executed = Vec::new();

    log::info!("Backup sweep started at {}", timestamp.to_rfc3339());

    let project_ids = storage.active_projects()?;
    log::info!("Found {} active projects", project_ids.len());

    for project_id in project_ids {
        match sweep_project(storage, cms, &project_id).await {
            Ok(Some(outcome)) => executed.push(outcome),
            Ok(None) => {}
            Err(e) => {
                log::error!("Error processing project {}: {}", project_id, e);
                executed.push(SweepOutcome {
                    project_id,
                    backup_type: BackupType::Daily,
                    run_id: String::new(),
                    status: SweepOutcomeStatus::Error,
                    error: Some(e),
                });
            }
        }
    }

    log::info!("Backup sweep completed. Processed {} backups", executed.len());

    Ok(SweepResponse {
        success: true,
        executed,
        timestamp,
    })
}

/// Process one project within a sweep; `None` when nothing was due
async fn sweep_project(
    storage: &Storage,
    cms: &dyn CmsBackend,
    project_id: &str,
) -> Result<Option<SweepOutcome>, String> {
    let config = match storage.get_config(project_id)? {
        Some(config) => config,
        None => {
            // Project was deleted after being marked active; stale, not an error
            log::info!("No config found for project {}, skipping", project_id);
            return Ok(None);
        }
    };

    let (runs, _) = storage.run_history(project_id, HISTORY_WINDOW, 0)?;
    let last_runs = last_trigger_per_type(&runs);

    let due = match next_due_backup(&config, &last_runs, Utc::now()) {
        Some(due) => due,
        None => {
            log::info!("Project {}: no backups due", project_id);
            return Ok(None);
        }
    };
    log::info!("Project {}: {} backup due", project_id, due.backup_type.as_str());

    let (run, success) = execute_run(
        storage,
        cms,
        &config,
        due.backup_type,
        &due.schedule.prefix,
        TriggerSource::Cron,
        None,
    )
    .await?;

    log::info!(
        "Project {}: {} backup {}",
        project_id,
        due.backup_type.as_str(),
        if success { "completed" } else { "failed" }
    );

    // Retention failures must never mark the backup itself as failed
    if success {
        let retention = enforce_retention(storage, cms, &config, due.backup_type).await;
        log::info!(
            "Project {}: cleaned up {} old environments",
            project_id,
            retention.deleted_environments.len()
        );
        for error in &retention.errors {
            log::warn!("Project {}: retention: {}", project_id, error);
        }
    }

    if let Err(e) = storage.touch_project(project_id) {
        log::warn!("Failed to update activity for project {}: {}", project_id, e);
    }

    Ok(Some(SweepOutcome {
        project_id: project_id.to_string(),
        backup_type: due.backup_type,
        run_id: run.id,
        status: if success {
            SweepOutcomeStatus::Started
        } else {
            SweepOutcomeStatus::Error
        },
        error: run.error,
    }))
}

/// Manually trigger one backup for an already-authenticated project config.
///
/// Bypasses due-ness entirely and runs synchronously, returning the terminal
/// run inline. Manual triggers do not run retention.
pub async fn trigger_backup(
    storage: &Storage,
    cms: &dyn CmsBackend,
    config: &BackupConfig,
    backup_type: BackupType,
    prefix: Option<String>,
    note: Option<String>,
) -> Result<TriggerBackupResponse, String> {
    let prefix = prefix.unwrap_or_else(|| format!("{}-backup", backup_type.as_str()));

    let (run, success) = execute_run(
        storage,
        cms,
        config,
        backup_type,
        &prefix,
        TriggerSource::Manual,
        note,
    )
    .await?;

    Ok(TriggerBackupResponse {
        success,
        error: run.error.clone(),
        run,
    })
}

/// Reduce run history (newest first) to the most recent trigger per type.
///
/// Every run counts regardless of status: a failed or stuck in_progress run
/// still suppresses a duplicate trigger within its window.
fn last_trigger_per_type(runs: &[BackupRun]) -> HashMap<BackupType, DateTime<Utc>> {
    let mut last_runs = HashMap::new();
    for run in runs {
        last_runs.entry(run.backup_type).or_insert(run.started_at);
    }
    last_runs
}

/// Append an in_progress run, perform the fork, record the terminal outcome
async fn execute_run(
    storage: &Storage,
    cms: &dyn CmsBackend,
    config: &BackupConfig,
    backup_type: BackupType,
    prefix: &str,
    triggered_by: TriggerSource,
    note: Option<String>,
) -> Result<(BackupRun, bool), String> {
    let started_at = Utc::now();
    let target_environment = generate_backup_environment_id(prefix, started_at);

    let run = BackupRun {
        id: Uuid::new_v4().to_string(),
        project_id: config.project_id.clone(),
        backup_type,
        status: BackupStatus::InProgress,
        source_environment: config.source_environment.clone(),
        target_environment: target_environment.clone(),
        started_at,
        completed_at: None,
        duration_ms: None,
        error: None,
        metadata: Some(BackupRunMetadata {
            triggered_by: Some(triggered_by),
            environment_id: None,
            note,
        }),
    };

    storage.add_run(&run)?;

    let start = std::time::Instant::now();
    let outcome = create_backup(
        cms,
        &config.api_token,
        &config.source_environment,
        &target_environment,
    )
    .await;
    let duration_ms = start.elapsed().as_millis() as i64;

    let mut completed = run;
    completed.status = if outcome.success {
        BackupStatus::Completed
    } else {
        BackupStatus::Failed
    };
    completed.completed_at = Some(Utc::now());
    completed.duration_ms = Some(duration_ms);
    completed.error = outcome.error;
    if let Some(metadata) = completed.metadata.as_mut() {
        metadata.environment_id = outcome.environment_id;
    }

    // A failed terminal write leaves the run in_progress; the due-ness rule
    // absorbs that, so log and move on rather than retry.
    if let Err(e) = storage.update_run(&completed) {
        log::error!("Failed to update run status for {}: {}", completed.id, e);
    }

    Ok((completed, outcome.success))
}
