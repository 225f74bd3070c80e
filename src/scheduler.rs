//! Due-ness evaluation and backup environment naming
//!
//! Fixed-window scheduling: daily fires once per UTC calendar day, weekly
//! once per 7 days, monthly once per 30 days. The window is measured against
//! the last *trigger* of the type, whatever its outcome — a failed or stuck
//! in_progress run still counts, which prevents pile-up when sweeps arrive
//! faster than forks complete.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::models::{BackupConfig, BackupType, ScheduleConfig};

/// A due backup selected for execution
#[derive(Debug, Clone)]
pub struct ScheduledBackup {
    pub backup_type: BackupType,
    pub schedule: ScheduleConfig,
}

/// Whether a backup of this type was already triggered within its window
pub fn was_already_triggered(
    backup_type: BackupType,
    last_triggered: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let last = match last_triggered {
        Some(last) => last,
        None => return false,
    };

    match backup_type {
        // Once per UTC calendar day, not a rolling 24h window: a run at
        // 23:59 does not suppress one at 00:01 the next day.
        BackupType::Daily => last.date_naive() == now.date_naive(),
        BackupType::Weekly => now - last < Duration::days(7),
        BackupType::Monthly => now - last < Duration::days(30),
        // Manual triggers bypass schedule checking entirely.
        BackupType::Manual => false,
    }
}

/// Pick the single most urgent due backup for a project, if any
///
/// Scans enabled schedules in priority order daily > weekly > monthly and
/// returns the first one whose window has passed. One sweep invocation only
/// has budget for one fork (forks take minutes), so remaining due types wait
/// for the next sweep.
pub fn next_due_backup(
    config: &BackupConfig,
    last_runs: &HashMap<BackupType, DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<ScheduledBackup> {
    for backup_type in BackupType::SCHEDULED {
        let schedule = match config.schedules.get(backup_type) {
            Some(schedule) if schedule.enabled => schedule,
            _ => continue,
        };

        let last_triggered = last_runs.get(&backup_type).copied();
        if !was_already_triggered(backup_type, last_triggered, now) {
            return Some(ScheduledBackup {
                backup_type,
                schedule: schedule.clone(),
            });
        }
    }

    None
}

/// Generate a target environment id: `{prefix}-{YYYY-MM-DD}-{HHMM}-{hex6}`
///
/// The date and time segments keep names sortable and readable; the random
/// suffix prevents collisions when two backups of the same type start within
/// the same minute (manual + scheduled overlap, or a retried run).
pub fn generate_backup_environment_id(prefix: &str, now: DateTime<Utc>) -> String {
    let suffix: [u8; 3] = rand::thread_rng().gen();
    format!(
        "{}-{}-{}-{}",
        prefix,
        now.format("%Y-%m-%d"),
        now.format("%H%M"),
        hex::encode(suffix)
    )
}
