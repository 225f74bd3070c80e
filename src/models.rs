//! Shared data model for backup configuration, runs, and the HTTP API
//!
//! Field names serialize as camelCase so stored JSON and API payloads match
//! what the plugin UI expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    /// The backup completed but its environment was later deleted by retention
    Cleaned,
}

/// Backup type: the three scheduled cadences plus manual triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Daily,
    Weekly,
    Monthly,
    Manual,
}

impl BackupType {
    /// Scheduled types in sweep priority order (daily > weekly > monthly)
    pub const SCHEDULED: [BackupType; 3] =
        [BackupType::Daily, BackupType::Weekly, BackupType::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Daily => "daily",
            BackupType::Weekly => "weekly",
            BackupType::Monthly => "monthly",
            BackupType::Manual => "manual",
        }
    }

    /// Parse from the wire representation, for query-string filters
    pub fn parse(value: &str) -> Option<BackupType> {
        match value {
            "daily" => Some(BackupType::Daily),
            "weekly" => Some(BackupType::Weekly),
            "monthly" => Some(BackupType::Monthly),
            "manual" => Some(BackupType::Manual),
            _ => None,
        }
    }
}

/// What initiated a backup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Cron,
    Manual,
}

/// Extra context attached to a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRunMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<TriggerSource>,
    /// Environment id reported by the CMS after a successful fork
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One attempted backup, scheduled or manual
///
/// Created as `InProgress` when the fork starts; exactly one terminal update
/// follows, setting `completed_at`, `duration_ms`, and `error` on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRun {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub status: BackupStatus,
    pub source_environment: String,
    pub target_environment: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the fork operation in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BackupRunMetadata>,
}

/// Per-type schedule settings
///
/// Due-ness is the fixed window implied by the type (daily = calendar day,
/// weekly = 7 days, monthly = 30 days), so the schedule only carries the
/// retention count and the environment naming prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// How many backup environments to keep for this type
    pub retention_count: usize,
    /// Naming prefix; also scopes which environments retention may delete
    pub prefix: String,
}

/// The three optional schedules of a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<ScheduleConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<ScheduleConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<ScheduleConfig>,
}

impl Schedules {
    pub fn get(&self, backup_type: BackupType) -> Option<&ScheduleConfig> {
        match backup_type {
            BackupType::Daily => self.daily.as_ref(),
            BackupType::Weekly => self.weekly.as_ref(),
            BackupType::Monthly => self.monthly.as_ref(),
            BackupType::Manual => None,
        }
    }
}

/// Webhook notification settings (stored and returned; dispatch is handled
/// by the notification worker, not this service)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub on_success: bool,
    pub on_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Per-project backup configuration
///
/// `project_id` is immutable once created. `api_token` is encrypted at rest
/// and masked in every API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    pub project_id: String,
    pub api_token: String,
    pub source_environment: String,
    #[serde(default)]
    pub schedules: Schedules,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupConfig {
    /// Copy with the API token replaced by a mask, for API responses
    pub fn masked(&self) -> BackupConfig {
        BackupConfig {
            api_token: "***".to_string(),
            ..self.clone()
        }
    }
}

/// Membership record in the active-project set swept by the cron handler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRegistration {
    pub project_id: String,
    pub site_name: String,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Default schedules, mirroring the plugin's setup defaults
pub fn default_schedules() -> Schedules {
    Schedules {
        daily: Some(ScheduleConfig {
            enabled: true,
            retention_count: 2,
            prefix: "daily-backup".to_string(),
        }),
        weekly: Some(ScheduleConfig {
            enabled: true,
            retention_count: 4,
            prefix: "weekly-backup".to_string(),
        }),
        monthly: Some(ScheduleConfig {
            enabled: false,
            retention_count: 3,
            prefix: "monthly-backup".to_string(),
        }),
    }
}

/// Max age in days per type; older environments are deleted even inside the
/// retention-count window
pub fn max_backup_age_days(backup_type: BackupType) -> Option<u32> {
    match backup_type {
        BackupType::Daily => Some(2),
        BackupType::Weekly => Some(30),
        BackupType::Monthly => Some(365),
        BackupType::Manual => None,
    }
}

// ---------------------------------------------------------------------------
// API request/response types
// ---------------------------------------------------------------------------

/// Standard error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// GET /api/health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage_connected: bool,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetConfigResponse {
    pub config: Option<BackupConfig>,
}

/// PUT /api/config — partial update merged over the existing config
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigRequest {
    pub project_id: String,
    pub api_token: String,
    #[serde(default)]
    pub config: Option<ConfigUpdates>,
}

/// Updatable subset of [`BackupConfig`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdates {
    #[serde(default)]
    pub source_environment: Option<String>,
    #[serde(default)]
    pub schedules: Option<Schedules>,
    #[serde(default)]
    pub notifications: Option<NotificationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigResponse {
    pub success: bool,
    pub config: BackupConfig,
}

/// POST /api/backup/trigger
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBackupRequest {
    pub project_id: String,
    #[serde(default)]
    pub backup_type: Option<BackupType>,
    #[serde(default)]
    pub options: Option<TriggerBackupOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBackupOptions {
    #[serde(default)]
    pub environment_prefix: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBackupResponse {
    pub success: bool,
    pub run: BackupRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/backup/history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub runs: Vec<BackupRun>,
    pub total: usize,
    pub has_more: bool,
}

/// One project's outcome within a sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub project_id: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub run_id: String,
    pub status: SweepOutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepOutcomeStatus {
    Started,
    Skipped,
    Error,
}

/// GET /api/cron/backup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub success: bool,
    pub executed: Vec<SweepOutcome>,
    pub timestamp: DateTime<Utc>,
}
