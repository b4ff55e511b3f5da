//! Error types
//!
//! Stores speak `anyhow::Result` like the rest of the plumbing; these typed
//! errors mark the failures callers are expected to branch on.

use thiserror::Error;
use uuid::Uuid;

/// Failure of a synchronization request
#[derive(Debug, Error)]
pub enum SyncError {
    /// Reading or writing the task store failed. Nothing was applied.
    #[error("task store unavailable for note {note_id}: {source}")]
    StoreUnavailable {
        note_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A coordinated run finished unsuccessfully
    #[error("sync run {run_id} failed: {message}")]
    RunFailed { run_id: Uuid, message: String },

    /// The coordinator was shut down before the request ran
    #[error("sync coordinator is closed")]
    CoordinatorClosed,
}

/// Rejection of a batch or metadata update by a task store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown task {0}")]
    UnknownTask(Uuid),

    #[error("task {0} is retired")]
    TaskRetired(Uuid),

    #[error("task {task_id} belongs to note {actual}, not {expected}")]
    NoteMismatch {
        task_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("task {0} already exists")]
    DuplicateId(Uuid),

    #[error("parent {parent_id} of task {task_id} is not an active task of this note")]
    UnknownParent { task_id: Uuid, parent_id: Uuid },
}
