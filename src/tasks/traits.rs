//! TaskStore trait definition
//!
//! The abstract interface the synchronization engine consumes. Records
//! arrive decrypted; how a store persists or encrypts them is its own
//! concern.

use super::models::{TaskOperation, TaskRecord, UpdateTaskMetadata};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Abstract interface for task persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Non-retired records of a note, ordered by position
    async fn get_active_tasks_for_note(&self, note_id: &str) -> Result<Vec<TaskRecord>>;

    /// Apply a reconciliation batch atomically: either every operation lands
    /// or none does.
    ///
    /// A create may name as parent a record created earlier in the same batch.
    async fn apply_operations(&self, note_id: &str, operations: &[TaskOperation]) -> Result<()>;

    /// Get a record by id, retired or not
    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>>;

    /// Records of a note ordered by position, optionally including retired ones
    async fn list_tasks_for_note(
        &self,
        note_id: &str,
        include_retired: bool,
    ) -> Result<Vec<TaskRecord>>;

    /// Update the user-owned fields of an active record.
    ///
    /// Returns `None` if the task does not exist.
    async fn update_task_metadata(
        &self,
        id: Uuid,
        update: &UpdateTaskMetadata,
    ) -> Result<Option<TaskRecord>>;
}
