//! Reconciliation of checklist candidates against stored tasks
//!
//! Candidates and records are matched on (fingerprint, occurrence ordinal).
//! Raw line numbers never take part, so prose edits, reordering and checkbox
//! toggles keep a line attached to its record while a text edit moves the
//! line to a new record (the old one is retired).
//!
//! Planning is pure ([`plan_reconciliation`]); [`ReconciliationEngine`] adds
//! the store read and the atomic apply around it.

use super::models::{DuplicateGroup, SyncCounts};
use crate::error::SyncError;
use crate::notes::{fingerprint, identity, ChecklistCandidate, Fingerprint};
use crate::tasks::{TaskChanges, TaskOperation, TaskRecord, TaskStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Operations that converge a note's records to its candidates
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Creates and updates in candidate order, then retires
    pub operations: Vec<TaskOperation>,
    pub counts: SyncCounts,
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Record id for each candidate, by candidate position
    pub task_ids: Vec<Uuid>,
}

/// Compute the operations that converge `existing` to `candidates`.
///
/// `existing` should hold the note's non-retired records; retired ones are
/// ignored.
pub fn plan_reconciliation(
    note_id: &str,
    candidates: &[ChecklistCandidate],
    mut existing: Vec<TaskRecord>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        counts: SyncCounts {
            candidates: candidates.len(),
            ..Default::default()
        },
        ..Default::default()
    };

    // Existing records by (fingerprint, ordinal). On a collision the oldest
    // record keeps the slot and the rest are retired.
    existing.retain(|t| !t.retired);
    existing.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut slots: HashMap<Fingerprint, BTreeMap<u32, TaskRecord>> = HashMap::new();
    let mut collisions: Vec<TaskRecord> = Vec::new();
    for record in existing {
        let by_ordinal = slots.entry(record.fingerprint.clone()).or_default();
        if by_ordinal.contains_key(&record.occurrence_ordinal) {
            tracing::warn!(
                note_id = %note_id,
                task_id = %record.id,
                fingerprint = %record.fingerprint.short(),
                ordinal = record.occurrence_ordinal,
                "Two active tasks share one checklist slot, retiring the newer"
            );
            collisions.push(record);
        } else {
            by_ordinal.insert(record.occurrence_ordinal, record);
        }
    }

    // Candidates in order; the ordinal is the rank within the fingerprint group
    let mut group_sizes: HashMap<Fingerprint, usize> = HashMap::new();
    let mut group_order: Vec<Fingerprint> = Vec::new();

    for candidate in candidates {
        let fp = fingerprint(note_id, &candidate.canonical_text);
        let seen = group_sizes.entry(fp.clone()).or_insert_with(|| {
            group_order.push(fp.clone());
            0
        });
        let ordinal = *seen as u32;
        *seen += 1;

        let position = candidate.position as u32;
        let parent_task_id = candidate
            .parent_index
            .and_then(|idx| plan.task_ids.get(idx).copied());

        let matched = slots
            .get_mut(&fp)
            .and_then(|by_ordinal| by_ordinal.remove(&ordinal));

        match matched {
            Some(record) => {
                let changes = diff_record(&record, candidate, position, parent_task_id);
                plan.task_ids.push(record.id);
                if changes.is_empty() {
                    plan.counts.unchanged += 1;
                } else {
                    plan.counts.updated += 1;
                    plan.operations.push(TaskOperation::Update {
                        id: record.id,
                        changes,
                    });
                }
            }
            None => {
                tracing::trace!(
                    note_id = %note_id,
                    identity = %identity(note_id, &fp, ordinal),
                    ordinal,
                    "New checklist item"
                );
                let record = TaskRecord::new(
                    note_id,
                    fp,
                    ordinal,
                    candidate.raw_text.clone(),
                    candidate.completed,
                    position,
                    parent_task_id,
                );
                plan.task_ids.push(record.id);
                plan.counts.created += 1;
                plan.operations.push(TaskOperation::Create(record));
            }
        }
    }

    // Whatever is left lost its line: ordinals past the group size and
    // fingerprints no candidate has anymore
    let mut leftovers: Vec<TaskRecord> = slots
        .into_values()
        .flat_map(|by_ordinal| by_ordinal.into_values())
        .chain(collisions)
        .collect();
    leftovers.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
    for record in leftovers {
        plan.counts.retired += 1;
        plan.operations.push(TaskOperation::Retire { id: record.id });
    }

    plan.duplicate_groups = group_order
        .into_iter()
        .filter_map(|fp| {
            let count = group_sizes.get(&fp).copied().unwrap_or(0);
            (count > 1).then_some(DuplicateGroup {
                fingerprint: fp,
                count,
            })
        })
        .collect();
    plan.counts.duplicate_groups = plan.duplicate_groups.len();

    plan
}

/// Fields of `record` that disagree with its candidate
fn diff_record(
    record: &TaskRecord,
    candidate: &ChecklistCandidate,
    position: u32,
    parent_task_id: Option<Uuid>,
) -> TaskChanges {
    TaskChanges {
        display_text: (record.display_text != candidate.raw_text)
            .then(|| candidate.raw_text.clone()),
        completed: (record.completed != candidate.completed).then_some(candidate.completed),
        position: (record.position != position).then_some(position),
        parent_task_id: (record.parent_task_id != parent_task_id).then_some(parent_task_id),
    }
}

/// Reads a note's records, plans, and applies the plan as one batch.
///
/// Not synchronized on its own: callers must serialize runs per note (the
/// [`super::SyncCoordinator`] does), or two overlapping runs could both plan
/// against the same read and create the same items twice.
pub struct ReconciliationEngine {
    store: Arc<dyn TaskStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Converge the note's records to `candidates`.
    ///
    /// On error nothing was applied.
    pub async fn reconcile(
        &self,
        note_id: &str,
        candidates: &[ChecklistCandidate],
    ) -> Result<ReconcilePlan, SyncError> {
        let existing = self
            .store
            .get_active_tasks_for_note(note_id)
            .await
            .map_err(|source| SyncError::StoreUnavailable {
                note_id: note_id.to_string(),
                source,
            })?;

        let plan = plan_reconciliation(note_id, candidates, existing);

        tracing::debug!(
            note_id = %note_id,
            created = plan.counts.created,
            updated = plan.counts.updated,
            unchanged = plan.counts.unchanged,
            retired = plan.counts.retired,
            "Reconciliation planned"
        );

        if !plan.operations.is_empty() {
            self.store
                .apply_operations(note_id, &plan.operations)
                .await
                .map_err(|source| SyncError::StoreUnavailable {
                    note_id: note_id.to_string(),
                    source,
                })?;
        }

        Ok(plan)
    }
}
