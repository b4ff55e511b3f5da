//! Task models and DTOs

use crate::notes::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A structured task backed by a checklist line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Assigned once at creation, never derived from the fingerprint
    pub id: Uuid,
    pub note_id: String,
    pub fingerprint: Fingerprint,
    /// Rank among this note's items sharing `fingerprint`
    pub occurrence_ordinal: u32,
    pub display_text: String,
    pub completed: bool,
    /// Index among the note's checklist items
    pub position: u32,
    pub parent_task_id: Option<Uuid>,

    // User-owned fields: never touched by reconciliation
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retired: bool,
    #[serde(default)]
    pub retired_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a new active record with a fresh id
    pub fn new(
        note_id: impl Into<String>,
        fingerprint: Fingerprint,
        occurrence_ordinal: u32,
        display_text: impl Into<String>,
        completed: bool,
        position: u32,
        parent_task_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            note_id: note_id.into(),
            fingerprint,
            occurrence_ordinal,
            display_text: display_text.into(),
            completed,
            position,
            parent_task_id,
            priority: None,
            due_date: None,
            labels: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: completed.then_some(now),
            retired: false,
            retired_at: None,
        }
    }

    /// Apply text-derived changes, stamping `updated_at` and `completed_at`
    pub fn apply_changes(&mut self, changes: &TaskChanges, now: DateTime<Utc>) {
        if let Some(text) = &changes.display_text {
            self.display_text = text.clone();
        }
        if let Some(completed) = changes.completed {
            if completed && !self.completed {
                self.completed_at = Some(now);
            } else if !completed {
                self.completed_at = None;
            }
            self.completed = completed;
        }
        if let Some(position) = changes.position {
            self.position = position;
        }
        if let Some(parent) = changes.parent_task_id {
            self.parent_task_id = parent;
        }
        self.updated_at = now;
    }

    /// Apply user-owned field changes
    pub fn apply_metadata(&mut self, update: &UpdateTaskMetadata, now: DateTime<Utc>) {
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = due_date;
        }
        if let Some(labels) = &update.labels {
            self.labels = labels.clone();
        }
        self.updated_at = now;
    }

    /// Soft-remove the record
    pub fn retire(&mut self, now: DateTime<Utc>) {
        self.retired = true;
        self.retired_at = Some(now);
        self.updated_at = now;
    }
}

/// Text-derived fields to change on a matched record.
///
/// `None` leaves a field alone. For `parent_task_id`, `Some(None)` moves the
/// task to the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<Option<Uuid>>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.display_text.is_none()
            && self.completed.is_none()
            && self.position.is_none()
            && self.parent_task_id.is_none()
    }
}

/// One mutation in a reconciliation batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaskOperation {
    Create(TaskRecord),
    Update { id: Uuid, changes: TaskChanges },
    Retire { id: Uuid },
}

impl TaskOperation {
    /// Id of the record the operation targets
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::Create(record) => record.id,
            Self::Update { id, .. } | Self::Retire { id } => *id,
        }
    }
}

/// Request to update the user-owned fields of a task
///
/// `Some(None)` clears `priority` / `due_date`. In JSON a missing key leaves
/// the field alone and an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTaskMetadata {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Option<i32>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

/// Present key (even `null`) becomes `Some(_)`; absence is handled by `default`
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
