//! JSON snapshot task store
//!
//! The JSON file is the source of truth. Every read and mutation reloads the
//! snapshot under the store's lock, so several handles (or processes) on the
//! same file see each other's writes. A mutation writes the new snapshot to a
//! sibling temp file and renames it into place.

use super::memory::TaskTable;
use super::models::{TaskOperation, TaskRecord, UpdateTaskMetadata};
use super::traits::TaskStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    tasks: Vec<TaskRecord>,
}

/// Task store persisted to a single JSON file
#[derive(Debug)]
pub struct JsonFileTaskStore {
    path: PathBuf,
    /// Serializes read-modify-write within this process
    lock: Mutex<()>,
}

impl JsonFileTaskStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = load_table(&path).await?;
        tracing::debug!(
            path = %path.display(),
            tasks = table.records().count(),
            "Opened task store"
        );

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the store and load the current snapshot
    async fn current(&self) -> Result<(MutexGuard<'_, ()>, TaskTable)> {
        let guard = self.lock.lock().await;
        let table = load_table(&self.path).await?;
        Ok((guard, table))
    }

    /// Write every record to disk, replacing the previous snapshot
    async fn persist<'a>(&self, records: impl Iterator<Item = &'a TaskRecord>) -> Result<()> {
        let mut tasks: Vec<&TaskRecord> = records.collect();
        tasks.sort_by(|a, b| {
            a.note_id
                .cmp(&b.note_id)
                .then(a.position.cmp(&b.position))
                .then(a.id.cmp(&b.id))
        });

        let json = serde_json::to_string_pretty(&serde_json::json!({
            "version": SNAPSHOT_VERSION,
            "tasks": tasks,
        }))?;

        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Read the snapshot at `path`; a missing file is an empty store
async fn load_table(path: &Path) -> Result<TaskTable> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let snapshot: Snapshot = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse task store {}", path.display()))?;
            if snapshot.version != SNAPSHOT_VERSION {
                anyhow::bail!(
                    "Unsupported task store version {} in {}",
                    snapshot.version,
                    path.display()
                );
            }
            Ok(TaskTable::from_records(snapshot.tasks))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TaskTable::default()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read task store {}", path.display()))
        }
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    async fn get_active_tasks_for_note(&self, note_id: &str) -> Result<Vec<TaskRecord>> {
        let (_guard, table) = self.current().await?;
        Ok(table.list(note_id, false))
    }

    async fn apply_operations(&self, note_id: &str, operations: &[TaskOperation]) -> Result<()> {
        let (_guard, mut table) = self.current().await?;
        let staged = table.stage(note_id, operations, Utc::now())?;
        table.commit(staged);
        self.persist(table.records()).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        let (_guard, table) = self.current().await?;
        Ok(table.get(id).cloned())
    }

    async fn list_tasks_for_note(
        &self,
        note_id: &str,
        include_retired: bool,
    ) -> Result<Vec<TaskRecord>> {
        let (_guard, table) = self.current().await?;
        Ok(table.list(note_id, include_retired))
    }

    async fn update_task_metadata(
        &self,
        id: Uuid,
        update: &UpdateTaskMetadata,
    ) -> Result<Option<TaskRecord>> {
        let (_guard, mut table) = self.current().await?;
        let Some(updated) = table.update_metadata(id, update, Utc::now())? else {
            return Ok(None);
        };
        self.persist(table.records()).await?;
        Ok(Some(updated))
    }
}
