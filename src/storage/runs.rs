//! Run ledger storage
//!
//! One file per run plus a per-project `index.json` ordered newest-first by
//! `started_at`. The index carries only what listing needs; full records are
//! read per page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

use super::{read_json, write_json, IndexFile, Storage, StorageResult};
use crate::models::BackupRun;

/// Run index entry (minimal info for ordering and pruning)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIndexEntry {
    pub id: String,
    pub started_at: DateTime<Utc>,
}

impl Storage {
    fn run_index_path(&self, project_id: &str) -> std::path::PathBuf {
        self.runs_dir(project_id).join("index.json")
    }

    fn read_run_index(&self, project_id: &str) -> StorageResult<IndexFile<RunIndexEntry>> {
        let path = self.run_index_path(project_id);
        if !path.exists() {
            return Ok(IndexFile::default());
        }
        read_json(&path)
    }

    fn write_run_index(&self, project_id: &str, mut entries: Vec<RunIndexEntry>) -> StorageResult<()> {
        // Newest first; pagination and pruning both rely on this order
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let index = IndexFile {
            version: 1,
            updated_at: Utc::now(),
            entries,
        };
        write_json(&self.run_index_path(project_id), &index)
    }

    /// Append a new run to the ledger
    pub fn add_run(&self, run: &BackupRun) -> StorageResult<()> {
        write_json(&self.run_path(&run.project_id, &run.id), run)?;

        let mut index = self.read_run_index(&run.project_id)?;
        if !index.entries.iter().any(|e| e.id == run.id) {
            index.entries.push(RunIndexEntry {
                id: run.id.clone(),
                started_at: run.started_at,
            });
            self.write_run_index(&run.project_id, index.entries)?;
        }

        log::debug!("Added run {} for project {}", run.id, run.project_id);
        Ok(())
    }

    /// Update a run in place (terminal status, cleaned label)
    pub fn update_run(&self, run: &BackupRun) -> StorageResult<()> {
        let path = self.run_path(&run.project_id, &run.id);
        if !path.exists() {
            return Err(format!("Run {} not found for update", run.id));
        }
        write_json(&path, run)
    }

    pub fn get_run(&self, project_id: &str, run_id: &str) -> StorageResult<Option<BackupRun>> {
        let path = self.run_path(project_id, run_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Page through runs newest-first; returns the page and the total count
    pub fn run_history(
        &self,
        project_id: &str,
        limit: usize,
        offset: usize,
    ) -> StorageResult<(Vec<BackupRun>, usize)> {
        let index = self.read_run_index(project_id)?;
        let total = index.entries.len();

        let mut runs = Vec::new();
        for entry in index.entries.iter().skip(offset).take(limit) {
            match self.get_run(project_id, &entry.id)? {
                Some(run) => runs.push(run),
                // Index entry without a record; skip rather than fail the page
                None => log::warn!("Run {} in index but file missing", entry.id),
            }
        }

        Ok((runs, total))
    }

    /// Prune the ledger to the newest `keep` entries; returns deleted run ids
    pub fn delete_old_runs(&self, project_id: &str, keep: usize) -> StorageResult<Vec<String>> {
        let index = self.read_run_index(project_id)?;
        if index.entries.len() <= keep {
            return Ok(Vec::new());
        }

        let (kept, pruned) = index.entries.split_at(keep);
        let mut deleted = Vec::new();

        for entry in pruned {
            let path = self.run_path(project_id, &entry.id);
            if path.exists() {
                fs::remove_file(&path)
                    .map_err(|e| format!("Failed to delete run {}: {}", entry.id, e))?;
            }
            deleted.push(entry.id.clone());
        }

        self.write_run_index(project_id, kept.to_vec())?;
        log::debug!(
            "Pruned {} old runs for project {}",
            deleted.len(),
            project_id
        );
        Ok(deleted)
    }
}
