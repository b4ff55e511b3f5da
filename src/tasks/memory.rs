//! In-memory implementation of TaskStore.
//!
//! All records sit in one [`TaskTable`] behind a single `tokio::sync::RwLock`,
//! so a batch is validated and committed under one write guard.

use super::models::{TaskOperation, TaskRecord, UpdateTaskMetadata};
use super::traits::TaskStore;
use crate::error::StoreError;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Record table with a per-note index.
#[derive(Debug, Default)]
pub(crate) struct TaskTable {
    records: HashMap<Uuid, TaskRecord>,
    by_note: HashMap<String, Vec<Uuid>>,
}

impl TaskTable {
    pub(crate) fn from_records(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            table.insert(record);
        }
        table
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &TaskRecord> {
        self.records.values()
    }

    fn insert(&mut self, record: TaskRecord) {
        if !self.records.contains_key(&record.id) {
            self.by_note
                .entry(record.note_id.clone())
                .or_default()
                .push(record.id);
        }
        self.records.insert(record.id, record);
    }

    pub(crate) fn get(&self, id: Uuid) -> Option<&TaskRecord> {
        self.records.get(&id)
    }

    pub(crate) fn list(&self, note_id: &str, include_retired: bool) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self
            .by_note
            .get(note_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .filter(|t| include_retired || !t.retired)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        tasks
    }

    /// Validate a batch against a staged copy of the records it touches.
    ///
    /// Returns the records to write back; the table itself is untouched.
    pub(crate) fn stage(
        &self,
        note_id: &str,
        operations: &[TaskOperation],
        now: DateTime<Utc>,
    ) -> Result<HashMap<Uuid, TaskRecord>, StoreError> {
        let mut staged: HashMap<Uuid, TaskRecord> = HashMap::new();

        for op in operations {
            match op {
                TaskOperation::Create(record) => {
                    if self.records.contains_key(&record.id) || staged.contains_key(&record.id) {
                        return Err(StoreError::DuplicateId(record.id));
                    }
                    if record.note_id != note_id {
                        return Err(StoreError::NoteMismatch {
                            task_id: record.id,
                            expected: note_id.to_string(),
                            actual: record.note_id.clone(),
                        });
                    }
                    if let Some(parent_id) = record.parent_task_id {
                        self.check_parent(&staged, note_id, record.id, parent_id)?;
                    }
                    staged.insert(record.id, record.clone());
                }
                TaskOperation::Update { id, changes } => {
                    if let Some(Some(parent_id)) = changes.parent_task_id {
                        self.check_parent(&staged, note_id, *id, parent_id)?;
                    }
                    let task = self.stage_active(&mut staged, note_id, *id)?;
                    task.apply_changes(changes, now);
                }
                TaskOperation::Retire { id } => {
                    let task = self.stage_active(&mut staged, note_id, *id)?;
                    task.retire(now);
                }
            }
        }

        Ok(staged)
    }

    pub(crate) fn commit(&mut self, staged: HashMap<Uuid, TaskRecord>) {
        for record in staged.into_values() {
            self.insert(record);
        }
    }

    /// Fetch an active record of `note_id` into the staging area
    fn stage_active<'a>(
        &self,
        staged: &'a mut HashMap<Uuid, TaskRecord>,
        note_id: &str,
        id: Uuid,
    ) -> Result<&'a mut TaskRecord, StoreError> {
        if !staged.contains_key(&id) {
            let current = self.records.get(&id).ok_or(StoreError::UnknownTask(id))?;
            staged.insert(id, current.clone());
        }
        let task = staged.get_mut(&id).ok_or(StoreError::UnknownTask(id))?;
        if task.note_id != note_id {
            return Err(StoreError::NoteMismatch {
                task_id: id,
                expected: note_id.to_string(),
                actual: task.note_id.clone(),
            });
        }
        if task.retired {
            return Err(StoreError::TaskRetired(id));
        }
        Ok(task)
    }

    fn check_parent(
        &self,
        staged: &HashMap<Uuid, TaskRecord>,
        note_id: &str,
        task_id: Uuid,
        parent_id: Uuid,
    ) -> Result<(), StoreError> {
        let parent = staged
            .get(&parent_id)
            .or_else(|| self.records.get(&parent_id));
        match parent {
            Some(p) if p.note_id == note_id && !p.retired => Ok(()),
            _ => Err(StoreError::UnknownParent { task_id, parent_id }),
        }
    }

    pub(crate) fn update_metadata(
        &mut self,
        id: Uuid,
        update: &UpdateTaskMetadata,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let Some(task) = self.records.get_mut(&id) else {
            return Ok(None);
        };
        if task.retired {
            return Err(StoreError::TaskRetired(id));
        }
        task.apply_metadata(update, now);
        Ok(Some(task.clone()))
    }
}

/// In-memory task store, suitable for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    table: RwLock<TaskTable>,
}

impl InMemoryTaskStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with records
    pub fn with_tasks(records: impl IntoIterator<Item = TaskRecord>) -> Self {
        Self {
            table: RwLock::new(TaskTable::from_records(records)),
        }
    }

    /// Total number of records, retired ones included
    pub async fn len(&self) -> usize {
        self.table.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_active_tasks_for_note(&self, note_id: &str) -> Result<Vec<TaskRecord>> {
        Ok(self.table.read().await.list(note_id, false))
    }

    async fn apply_operations(&self, note_id: &str, operations: &[TaskOperation]) -> Result<()> {
        let mut table = self.table.write().await;
        let staged = table.stage(note_id, operations, Utc::now())?;
        table.commit(staged);
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        Ok(self.table.read().await.get(id).cloned())
    }

    async fn list_tasks_for_note(
        &self,
        note_id: &str,
        include_retired: bool,
    ) -> Result<Vec<TaskRecord>> {
        Ok(self.table.read().await.list(note_id, include_retired))
    }

    async fn update_task_metadata(
        &self,
        id: Uuid,
        update: &UpdateTaskMetadata,
    ) -> Result<Option<TaskRecord>> {
        let mut table = self.table.write().await;
        Ok(table.update_metadata(id, update, Utc::now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::fingerprint;
    use crate::tasks::models::TaskChanges;

    fn task(note_id: &str, text: &str, position: u32) -> TaskRecord {
        TaskRecord::new(
            note_id,
            fingerprint(note_id, text),
            0,
            text,
            false,
            position,
            None,
        )
    }

    #[tokio::test]
    async fn test_apply_create_update_retire() {
        let store = InMemoryTaskStore::new();
        let a = task("n1", "a", 0);
        let b = task("n1", "b", 1);

        store
            .apply_operations(
                "n1",
                &[
                    TaskOperation::Create(a.clone()),
                    TaskOperation::Create(b.clone()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.get_active_tasks_for_note("n1").await.unwrap().len(), 2);

        store
            .apply_operations(
                "n1",
                &[
                    TaskOperation::Update {
                        id: a.id,
                        changes: TaskChanges {
                            completed: Some(true),
                            ..Default::default()
                        },
                    },
                    TaskOperation::Retire { id: b.id },
                ],
            )
            .await
            .unwrap();

        let active = store.get_active_tasks_for_note("n1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].completed);

        let retired = store.get_task(b.id).await.unwrap().unwrap();
        assert!(retired.retired);
        assert!(retired.retired_at.is_some());
        assert_eq!(store.list_tasks_for_note("n1", true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_batch_applies_nothing() {
        let store = InMemoryTaskStore::new();
        let a = task("n1", "a", 0);
        store
            .apply_operations("n1", &[TaskOperation::Create(a.clone())])
            .await
            .unwrap();

        let c = task("n1", "c", 1);
        let err = store
            .apply_operations(
                "n1",
                &[
                    TaskOperation::Create(c.clone()),
                    TaskOperation::Retire { id: a.id },
                    TaskOperation::Retire { id: Uuid::new_v4() },
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::UnknownTask(_))
        ));
        assert!(store.get_task(c.id).await.unwrap().is_none());
        assert!(!store.get_task(a.id).await.unwrap().unwrap().retired);
    }

    #[tokio::test]
    async fn test_create_with_parent_from_same_batch() {
        let store = InMemoryTaskStore::new();
        let parent = task("n1", "parent", 0);
        let mut child = task("n1", "child", 1);
        child.parent_task_id = Some(parent.id);

        store
            .apply_operations(
                "n1",
                &[TaskOperation::Create(parent), TaskOperation::Create(child)],
            )
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_rejects_foreign_note_and_retired_targets() {
        let store = InMemoryTaskStore::new();
        let a = task("n1", "a", 0);
        store
            .apply_operations("n1", &[TaskOperation::Create(a.clone())])
            .await
            .unwrap();

        let err = store
            .apply_operations("n2", &[TaskOperation::Retire { id: a.id }])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NoteMismatch { .. })
        ));

        store
            .apply_operations("n1", &[TaskOperation::Retire { id: a.id }])
            .await
            .unwrap();
        let err = store
            .apply_operations("n1", &[TaskOperation::Retire { id: a.id }])
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::TaskRetired(a.id))
        );
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let a = task("n1", "a", 0);
        let store = InMemoryTaskStore::with_tasks([a.clone()]);

        let updated = store
            .update_task_metadata(
                a.id,
                &UpdateTaskMetadata {
                    priority: Some(Some(2)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.priority, Some(2));

        let missing = store
            .update_task_metadata(Uuid::new_v4(), &UpdateTaskMetadata::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_position() {
        let store = InMemoryTaskStore::with_tasks([task("n1", "b", 1), task("n1", "a", 0)]);
        let listed = store.list_tasks_for_note("n1", false).await.unwrap();
        let texts: Vec<_> = listed.iter().map(|t| t.display_text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert!(store.list_tasks_for_note("other", true).await.unwrap().is_empty());
    }
}
