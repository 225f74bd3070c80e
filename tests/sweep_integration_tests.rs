//! End-to-end sweep and trigger tests against a scripted in-memory CMS

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use dato_backup_lib::cms::{CmsBackend, CmsError, Environment};
use dato_backup_lib::crypto::TokenCipher;
use dato_backup_lib::models::{
    BackupConfig, BackupStatus, BackupType, ProjectRegistration, ScheduleConfig, Schedules,
    SweepOutcomeStatus, TriggerSource,
};
use dato_backup_lib::storage::Storage;
use dato_backup_lib::sweep::{run_scheduled_sweep, trigger_backup};

/// In-memory CMS double with scriptable failures
struct FakeCms {
    environments: Mutex<Vec<Environment>>,
    /// Source ids whose fork reports NotFound
    missing_sources: Mutex<HashSet<String>>,
    /// Target prefixes whose fork fails with an API error
    failing_target_prefixes: Mutex<Vec<String>>,
}

impl FakeCms {
    fn new(environments: Vec<Environment>) -> Self {
        Self {
            environments: Mutex::new(environments),
            missing_sources: Mutex::new(HashSet::new()),
            failing_target_prefixes: Mutex::new(Vec::new()),
        }
    }

    fn with_primary() -> Self {
        Self::new(vec![environment("main", true, Utc::now() - Duration::days(90))])
    }

    fn fail_forks_to(&self, target_prefix: &str) {
        self.failing_target_prefixes
            .lock()
            .unwrap()
            .push(target_prefix.to_string());
    }

    fn mark_source_missing(&self, source_id: &str) {
        self.missing_sources
            .lock()
            .unwrap()
            .insert(source_id.to_string());
    }

    fn environment_ids(&self) -> Vec<String> {
        self.environments
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.id.clone())
            .collect()
    }
}

#[async_trait]
impl CmsBackend for FakeCms {
    async fn list_environments(&self, _api_token: &str) -> Result<Vec<Environment>, CmsError> {
        Ok(self.environments.lock().unwrap().clone())
    }

    async fn fork_environment(
        &self,
        _api_token: &str,
        source_id: &str,
        new_id: &str,
    ) -> Result<Environment, CmsError> {
        if self.missing_sources.lock().unwrap().contains(source_id) {
            return Err(CmsError::NotFound(source_id.to_string()));
        }
        if self
            .failing_target_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| new_id.starts_with(prefix.as_str()))
        {
            return Err(CmsError::Api {
                status: 422,
                message: "environment limit reached".to_string(),
            });
        }
        let mut environments = self.environments.lock().unwrap();
        if !environments.iter().any(|e| e.id == source_id) {
            return Err(CmsError::NotFound(source_id.to_string()));
        }
        let forked = environment(new_id, false, Utc::now());
        environments.push(forked.clone());
        Ok(forked)
    }

    async fn delete_environment(
        &self,
        _api_token: &str,
        environment_id: &str,
    ) -> Result<(), CmsError> {
        let mut environments = self.environments.lock().unwrap();
        let before = environments.len();
        environments.retain(|e| e.id != environment_id);
        if environments.len() == before {
            return Err(CmsError::NotFound(environment_id.to_string()));
        }
        Ok(())
    }
}

fn environment(id: &str, primary: bool, created_at: DateTime<Utc>) -> Environment {
    Environment {
        id: id.to_string(),
        primary,
        created_at,
    }
}

fn test_storage(dir: &TempDir) -> Storage {
    Storage::new(dir.path().to_path_buf(), TokenCipher::new([3u8; 32])).unwrap()
}

fn daily_only_schedules(retention_count: usize) -> Schedules {
    Schedules {
        daily: Some(ScheduleConfig {
            enabled: true,
            retention_count,
            prefix: "daily-backup".to_string(),
        }),
        weekly: None,
        monthly: None,
    }
}

fn setup_project(storage: &Storage, project_id: &str, source: &str, schedules: Schedules) {
    let now = Utc::now();
    storage
        .set_config(&BackupConfig {
            project_id: project_id.to_string(),
            api_token: "token0123456789abcdefghij".to_string(),
            source_environment: source.to_string(),
            schedules,
            notifications: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    storage
        .register_project(&ProjectRegistration {
            project_id: project_id.to_string(),
            site_name: project_id.to_string(),
            registered_at: now,
            last_active_at: now,
        })
        .unwrap();
}

#[tokio::test]
async fn test_first_sweep_runs_one_daily_backup() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();
    setup_project(&storage, "p1", "main", daily_only_schedules(2));

    let response = run_scheduled_sweep(&storage, &cms).await.unwrap();

    assert!(response.success);
    assert_eq!(response.executed.len(), 1);
    let outcome = &response.executed[0];
    assert_eq!(outcome.project_id, "p1");
    assert_eq!(outcome.backup_type, BackupType::Daily);
    assert_eq!(outcome.status, SweepOutcomeStatus::Started);

    let run = storage.get_run("p1", &outcome.run_id).unwrap().unwrap();
    assert_eq!(run.status, BackupStatus::Completed);
    assert!(run.target_environment.starts_with("daily-backup-"));
    assert!(run.completed_at.is_some());
    assert_eq!(
        run.metadata.as_ref().unwrap().triggered_by,
        Some(TriggerSource::Cron)
    );

    // The fork landed on the CMS
    assert!(cms.environment_ids().contains(&run.target_environment));
}

#[tokio::test]
async fn test_second_sweep_same_day_does_nothing() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();
    setup_project(&storage, "p1", "main", daily_only_schedules(2));

    let first = run_scheduled_sweep(&storage, &cms).await.unwrap();
    assert_eq!(first.executed.len(), 1);

    let second = run_scheduled_sweep(&storage, &cms).await.unwrap();
    assert!(second.success);
    assert!(second.executed.is_empty());
}

#[tokio::test]
async fn test_failed_backup_still_suppresses_retry() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    // No environments at all, so the fork and the primary fallback both fail
    let cms = FakeCms::new(Vec::new());
    setup_project(&storage, "p1", "main", daily_only_schedules(2));

    let first = run_scheduled_sweep(&storage, &cms).await.unwrap();
    assert_eq!(first.executed.len(), 1);
    assert_eq!(first.executed[0].status, SweepOutcomeStatus::Error);
    assert!(first.executed[0].error.is_some());

    let run = storage
        .get_run("p1", &first.executed[0].run_id)
        .unwrap()
        .unwrap();
    assert_eq!(run.status, BackupStatus::Failed);

    // The failed run already counts as today's trigger
    let second = run_scheduled_sweep(&storage, &cms).await.unwrap();
    assert!(second.executed.is_empty());
}

#[tokio::test]
async fn test_missing_source_falls_back_to_primary() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();
    cms.mark_source_missing("renamed-away");
    setup_project(&storage, "p1", "renamed-away", daily_only_schedules(2));

    let response = run_scheduled_sweep(&storage, &cms).await.unwrap();

    assert_eq!(response.executed.len(), 1);
    assert_eq!(response.executed[0].status, SweepOutcomeStatus::Started);

    let run = storage
        .get_run("p1", &response.executed[0].run_id)
        .unwrap()
        .unwrap();
    assert_eq!(run.status, BackupStatus::Completed);
    assert!(cms.environment_ids().contains(&run.target_environment));
}

#[tokio::test]
async fn test_project_failure_does_not_abort_siblings() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();

    let broken_schedules = Schedules {
        daily: Some(ScheduleConfig {
            enabled: true,
            retention_count: 2,
            prefix: "broken-backup".to_string(),
        }),
        weekly: None,
        monthly: None,
    };
    setup_project(&storage, "broken", "main", broken_schedules);
    setup_project(&storage, "healthy", "main", daily_only_schedules(2));
    cms.fail_forks_to("broken-backup");

    let response = run_scheduled_sweep(&storage, &cms).await.unwrap();

    // Registration order is preserved; the failure stays contained
    assert_eq!(response.executed.len(), 2);
    assert_eq!(response.executed[0].project_id, "broken");
    assert_eq!(response.executed[0].status, SweepOutcomeStatus::Error);
    assert_eq!(response.executed[1].project_id, "healthy");
    assert_eq!(response.executed[1].status, SweepOutcomeStatus::Started);
}

#[tokio::test]
async fn test_retention_prunes_old_environments_after_backup() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let now = Utc::now();
    let mut seeded = vec![environment("main", true, now - Duration::days(90))];
    for i in 0..5 {
        seeded.push(environment(
            &format!("daily-backup-old-{}", i),
            false,
            now - Duration::days(10 + i),
        ));
    }
    let cms = FakeCms::new(seeded);
    setup_project(&storage, "p1", "main", daily_only_schedules(2));

    let response = run_scheduled_sweep(&storage, &cms).await.unwrap();
    assert_eq!(response.executed[0].status, SweepOutcomeStatus::Started);

    // All seeded backups exceed the daily max age; only the fresh one survives
    let remaining: Vec<String> = cms
        .environment_ids()
        .into_iter()
        .filter(|id| id.starts_with("daily-backup"))
        .collect();
    assert_eq!(remaining.len(), 1);
    assert!(!remaining[0].starts_with("daily-backup-old"));
    // The primary is untouched
    assert!(cms.environment_ids().contains(&"main".to_string()));
}

#[tokio::test]
async fn test_manual_trigger_bypasses_schedule_and_skips_retention() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();
    setup_project(&storage, "p1", "main", daily_only_schedules(1));

    // Use up today's scheduled slot first
    run_scheduled_sweep(&storage, &cms).await.unwrap();

    let config = storage.get_config("p1").unwrap().unwrap();
    let response = trigger_backup(
        &storage,
        &cms,
        &config,
        BackupType::Manual,
        Some("pre-deploy".to_string()),
        Some("before the big release".to_string()),
    )
    .await
    .unwrap();

    assert!(response.success);
    assert_eq!(response.run.status, BackupStatus::Completed);
    assert!(response.run.target_environment.starts_with("pre-deploy-"));
    let metadata = response.run.metadata.as_ref().unwrap();
    assert_eq!(metadata.triggered_by, Some(TriggerSource::Manual));
    assert_eq!(metadata.note.as_deref(), Some("before the big release"));

    // Retention did not run: both the scheduled and the manual backup remain
    // even though the daily retention count is 1
    let backups: Vec<String> = cms
        .environment_ids()
        .into_iter()
        .filter(|id| !id.starts_with("main"))
        .collect();
    assert_eq!(backups.len(), 2);
}

#[tokio::test]
async fn test_manual_trigger_default_prefix() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();
    setup_project(&storage, "p1", "main", daily_only_schedules(2));

    let config = storage.get_config("p1").unwrap().unwrap();
    let response = trigger_backup(&storage, &cms, &config, BackupType::Manual, None, None)
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.run.target_environment.starts_with("manual-backup-"));
}

#[tokio::test]
async fn test_sweep_skips_project_without_config() {
    let dir = TempDir::new().unwrap();
    let storage = test_storage(&dir);
    let cms = FakeCms::with_primary();

    // Registered but its config was deleted
    storage
        .register_project(&ProjectRegistration {
            project_id: "ghost".to_string(),
            site_name: "ghost".to_string(),
            registered_at: Utc::now(),
            last_active_at: Utc::now(),
        })
        .unwrap();

    let response = run_scheduled_sweep(&storage, &cms).await.unwrap();
    assert!(response.success);
    assert!(response.executed.is_empty());
}
