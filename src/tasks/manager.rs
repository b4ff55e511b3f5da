//! Task management operations
//!
//! The user-facing side of the task store: priority, due date and labels are
//! owned here, never by reconciliation.

use super::models::{TaskRecord, UpdateTaskMetadata};
use super::traits::TaskStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Receives due-date changes so reminders can be (re)scheduled.
///
/// Fire-and-forget: implementations must not block the caller.
pub trait ReminderBridge: Send + Sync {
    fn due_date_changed(&self, task: &TaskRecord, previous: Option<DateTime<Utc>>);
}

/// Manager for task operations
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    reminders: Option<Arc<dyn ReminderBridge>>,
}

impl TaskManager {
    /// Create a new task manager
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            reminders: None,
        }
    }

    /// Notify `bridge` whenever a due date changes (builder pattern).
    pub fn with_reminder_bridge(mut self, bridge: Arc<dyn ReminderBridge>) -> Self {
        self.reminders = Some(bridge);
        self
    }

    /// Get a task by ID
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskRecord>> {
        self.store.get_task(task_id).await
    }

    /// List a note's tasks in checklist order
    pub async fn list_note_tasks(
        &self,
        note_id: &str,
        include_retired: bool,
    ) -> Result<Vec<TaskRecord>> {
        self.store.list_tasks_for_note(note_id, include_retired).await
    }

    /// Update user-owned fields of a task.
    ///
    /// Returns `None` if the task does not exist. Fails for retired tasks.
    pub async fn update_task_metadata(
        &self,
        task_id: Uuid,
        update: UpdateTaskMetadata,
    ) -> Result<Option<TaskRecord>> {
        let previous_due = match self.store.get_task(task_id).await? {
            Some(task) => task.due_date,
            None => return Ok(None),
        };

        let Some(updated) = self.store.update_task_metadata(task_id, &update).await? else {
            return Ok(None);
        };

        if updated.due_date != previous_due {
            tracing::debug!(
                task_id = %task_id,
                due_date = ?updated.due_date,
                "Task due date changed"
            );
            if let Some(bridge) = &self.reminders {
                bridge.due_date_changed(&updated, previous_due);
            }
        }

        Ok(Some(updated))
    }
}
