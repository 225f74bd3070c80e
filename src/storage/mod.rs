//! File-backed persistence for configs, project registrations, and runs
//!
//! One JSON file per entity plus an `index.json` per collection for cheap
//! listing, written atomically (temp file + rename). Layout under the data
//! directory:
//!
//! - `configs/{projectId}.json` — config with the API token encrypted
//! - `projects/{projectId}.json` + `projects/index.json` — the active set
//! - `runs/{projectId}/{runId}.json` + `runs/{projectId}/index.json`

mod runs;

pub use runs::RunIndexEntry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::{is_encrypted, TokenCipher};
use crate::models::{BackupConfig, BackupRun, ProjectRegistration};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, String>;

/// Version of the index file format
const INDEX_VERSION: u32 = 1;

/// Generic index file wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile<T> {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<T>,
}

impl<T> Default for IndexFile<T> {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            updated_at: Utc::now(),
            entries: Vec::new(),
        }
    }
}

/// Project index entry (minimal info for the active-project sweep)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIndexEntry {
    pub project_id: String,
    pub registered_at: DateTime<Utc>,
}

/// Create a directory if it doesn't exist
pub fn ensure_dir(path: &Path) -> StorageResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory {:?}: {}", path, e))?;
    }
    Ok(())
}

/// Write a file atomically via a temp file + rename
pub fn atomic_write(path: &Path, content: &str) -> StorageResult<()> {
    let temp_path = path.with_extension("json.tmp");

    fs::write(&temp_path, content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;
    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e))?;

    Ok(())
}

/// Read and deserialize a JSON file
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
}

/// Serialize and write a JSON file atomically
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize {:?}: {}", path, e))?;
    atomic_write(path, &content)
}

/// File-backed storage rooted at a data directory
///
/// API tokens are encrypted before hitting disk and decrypted on read;
/// configs written before encryption existed (plaintext tokens) are
/// tolerated on read.
#[derive(Clone)]
pub struct Storage {
    data_dir: PathBuf,
    cipher: TokenCipher,
}

impl Storage {
    pub fn new(data_dir: PathBuf, cipher: TokenCipher) -> StorageResult<Self> {
        ensure_dir(&data_dir)?;
        Ok(Self { data_dir, cipher })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Health probe: the data directory exists and is listable
    pub fn is_reachable(&self) -> bool {
        fs::read_dir(&self.data_dir).is_ok()
    }

    // -- configs ------------------------------------------------------------

    fn config_path(&self, project_id: &str) -> PathBuf {
        self.data_dir
            .join("configs")
            .join(format!("{}.json", project_id))
    }

    pub fn get_config(&self, project_id: &str) -> StorageResult<Option<BackupConfig>> {
        let path = self.config_path(project_id);
        if !path.exists() {
            return Ok(None);
        }

        let mut config: BackupConfig = read_json(&path)?;

        if is_encrypted(&config.api_token) {
            config.api_token = self
                .cipher
                .decrypt(&config.api_token)
                .map_err(|e| format!("Failed to decrypt API token for {}: {}", project_id, e))?;
        }
        // Legacy plaintext tokens pass through unchanged

        Ok(Some(config))
    }

    pub fn set_config(&self, config: &BackupConfig) -> StorageResult<()> {
        let mut stored = config.clone();
        stored.api_token = self.cipher.encrypt(&config.api_token)?;

        write_json(&self.config_path(&config.project_id), &stored)?;
        log::debug!("Saved config for project {}", config.project_id);
        Ok(())
    }

    pub fn delete_config(&self, project_id: &str) -> StorageResult<()> {
        let path = self.config_path(project_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| format!("Failed to delete config: {}", e))?;
            log::info!("Deleted config for project {}", project_id);
        }
        Ok(())
    }

    // -- project registrations ----------------------------------------------

    fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    fn project_path(&self, project_id: &str) -> PathBuf {
        self.projects_dir().join(format!("{}.json", project_id))
    }

    fn project_index_path(&self) -> PathBuf {
        self.projects_dir().join("index.json")
    }

    fn read_project_index(&self) -> StorageResult<IndexFile<ProjectIndexEntry>> {
        let path = self.project_index_path();
        if !path.exists() {
            return Ok(IndexFile::default());
        }
        read_json(&path)
    }

    fn write_project_index(&self, entries: Vec<ProjectIndexEntry>) -> StorageResult<()> {
        let index = IndexFile {
            version: INDEX_VERSION,
            updated_at: Utc::now(),
            entries,
        };
        write_json(&self.project_index_path(), &index)
    }

    pub fn register_project(&self, registration: &ProjectRegistration) -> StorageResult<()> {
        write_json(&self.project_path(&registration.project_id), registration)?;

        let mut index = self.read_project_index()?;
        if !index
            .entries
            .iter()
            .any(|e| e.project_id == registration.project_id)
        {
            index.entries.push(ProjectIndexEntry {
                project_id: registration.project_id.clone(),
                registered_at: registration.registered_at,
            });
            self.write_project_index(index.entries)?;
        }

        log::info!("Registered project {}", registration.project_id);
        Ok(())
    }

    pub fn unregister_project(&self, project_id: &str) -> StorageResult<()> {
        let path = self.project_path(project_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| format!("Failed to delete registration: {}", e))?;
        }

        let mut index = self.read_project_index()?;
        let initial_len = index.entries.len();
        index.entries.retain(|e| e.project_id != project_id);
        if index.entries.len() != initial_len {
            self.write_project_index(index.entries)?;
        }

        log::info!("Unregistered project {}", project_id);
        Ok(())
    }

    /// Project ids eligible for the periodic sweep, oldest registration first
    pub fn active_projects(&self) -> StorageResult<Vec<String>> {
        let mut index = self.read_project_index()?;
        index.entries.sort_by_key(|e| e.registered_at);
        Ok(index.entries.into_iter().map(|e| e.project_id).collect())
    }

    pub fn get_registration(&self, project_id: &str) -> StorageResult<Option<ProjectRegistration>> {
        let path = self.project_path(project_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn touch_project(&self, project_id: &str) -> StorageResult<()> {
        if let Some(mut registration) = self.get_registration(project_id)? {
            registration.last_active_at = Utc::now();
            write_json(&self.project_path(project_id), &registration)?;
        }
        Ok(())
    }

    // -- runs (implemented in runs.rs) ---------------------------------------

    pub(crate) fn runs_dir(&self, project_id: &str) -> PathBuf {
        self.data_dir.join("runs").join(project_id)
    }

    pub(crate) fn run_path(&self, project_id: &str, run_id: &str) -> PathBuf {
        self.runs_dir(project_id).join(format!("{}.json", run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_schedules, Schedules};
    use tempfile::TempDir;

    fn test_storage(dir: &TempDir) -> Storage {
        Storage::new(dir.path().to_path_buf(), TokenCipher::new([1u8; 32])).unwrap()
    }

    fn test_config(project_id: &str) -> BackupConfig {
        BackupConfig {
            project_id: project_id.to_string(),
            api_token: "plaintext-token-0123456789".to_string(),
            source_environment: "main".to_string(),
            schedules: default_schedules(),
            notifications: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_registration(project_id: &str) -> ProjectRegistration {
        ProjectRegistration {
            project_id: project_id.to_string(),
            site_name: project_id.to_string(),
            registered_at: Utc::now(),
            last_active_at: Utc::now(),
        }
    }

    #[test]
    fn test_config_round_trip_encrypts_at_rest() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);
        let config = test_config("12345");

        storage.set_config(&config).unwrap();

        // On disk the token must not appear in plaintext
        let raw = fs::read_to_string(storage.config_path("12345")).unwrap();
        assert!(!raw.contains("plaintext-token-0123456789"));

        let loaded = storage.get_config("12345").unwrap().unwrap();
        assert_eq!(loaded.api_token, "plaintext-token-0123456789");
        assert_eq!(loaded.source_environment, "main");
    }

    #[test]
    fn test_legacy_plaintext_token_tolerated() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);

        // Simulate a config written before encryption existed
        let config = BackupConfig {
            schedules: Schedules::default(),
            ..test_config("legacy")
        };
        write_json(&storage.config_path("legacy"), &config).unwrap();

        let loaded = storage.get_config("legacy").unwrap().unwrap();
        assert_eq!(loaded.api_token, "plaintext-token-0123456789");
    }

    #[test]
    fn test_get_config_missing() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);
        assert!(storage.get_config("nope").unwrap().is_none());
    }

    #[test]
    fn test_register_and_unregister_project() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);

        storage.register_project(&test_registration("111")).unwrap();
        storage.register_project(&test_registration("222")).unwrap();
        // Registering twice must not duplicate the index entry
        storage.register_project(&test_registration("111")).unwrap();

        let active = storage.active_projects().unwrap();
        assert_eq!(active, vec!["111".to_string(), "222".to_string()]);

        storage.unregister_project("111").unwrap();
        assert_eq!(storage.active_projects().unwrap(), vec!["222".to_string()]);
        assert!(storage.get_registration("111").unwrap().is_none());
    }

    #[test]
    fn test_touch_project_updates_last_active() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);

        let mut registration = test_registration("333");
        registration.last_active_at = Utc::now() - chrono::Duration::days(3);
        storage.register_project(&registration).unwrap();

        storage.touch_project("333").unwrap();

        let reloaded = storage.get_registration("333").unwrap().unwrap();
        assert!(Utc::now() - reloaded.last_active_at < chrono::Duration::minutes(1));
    }

    #[test]
    fn test_touch_unknown_project_is_noop() {
        let dir = TempDir::new().unwrap();
        let storage = test_storage(&dir);
        storage.touch_project("ghost").unwrap();
    }
}
