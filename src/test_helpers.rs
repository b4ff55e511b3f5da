//! Test doubles for the sync pipeline
//!
//! Recording metrics sink plus task stores that fail or block on demand.
#![allow(dead_code)]

use crate::notes::Fingerprint;
use crate::sync::{MetricsSink, SyncCounts, SyncStartMetadata};
use crate::tasks::{InMemoryTaskStore, TaskOperation, TaskRecord, TaskStore, UpdateTaskMetadata};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMetric {
    Start {
        run_id: Uuid,
        note_id: String,
        metadata: SyncStartMetadata,
    },
    DuplicateGroup {
        run_id: Uuid,
        note_id: String,
        fingerprint: Fingerprint,
        count: usize,
    },
    End {
        run_id: Uuid,
        success: bool,
        counts: SyncCounts,
    },
}

/// Sink that keeps every observation in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedMetric>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RecordedMetric> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, metric: RecordedMetric) {
        self.events.lock().unwrap().push(metric);
    }
}

impl MetricsSink for RecordingSink {
    fn record_sync_start(&self, run_id: Uuid, note_id: &str, metadata: &SyncStartMetadata) {
        self.push(RecordedMetric::Start {
            run_id,
            note_id: note_id.to_string(),
            metadata: metadata.clone(),
        });
    }

    fn record_duplicate_group(
        &self,
        run_id: Uuid,
        note_id: &str,
        fingerprint: &Fingerprint,
        count: usize,
    ) {
        self.push(RecordedMetric::DuplicateGroup {
            run_id,
            note_id: note_id.to_string(),
            fingerprint: fingerprint.clone(),
            count,
        });
    }

    fn record_sync_end(&self, run_id: Uuid, success: bool, counts: &SyncCounts) {
        self.push(RecordedMetric::End {
            run_id,
            success,
            counts: *counts,
        });
    }
}

// ============================================================================
// Stores
// ============================================================================

/// In-memory store whose reads and applies can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryTaskStore,
    fail_reads: AtomicBool,
    fail_applies: AtomicBool,
    panic_next_read: AtomicBool,
    apply_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn inner(&self) -> &InMemoryTaskStore {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_applies(&self, fail: bool) {
        self.fail_applies.store(fail, Ordering::SeqCst);
    }

    /// Make the next read panic instead of returning
    pub fn panic_next_read(&self) {
        self.panic_next_read.store(true, Ordering::SeqCst);
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for FlakyStore {
    async fn get_active_tasks_for_note(&self, note_id: &str) -> Result<Vec<TaskRecord>> {
        if self.panic_next_read.swap(false, Ordering::SeqCst) {
            panic!("store read blew up");
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("store offline"));
        }
        self.inner.get_active_tasks_for_note(note_id).await
    }

    async fn apply_operations(&self, note_id: &str, operations: &[TaskOperation]) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(anyhow!("store rejected batch"));
        }
        self.inner.apply_operations(note_id, operations).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        self.inner.get_task(id).await
    }

    async fn list_tasks_for_note(
        &self,
        note_id: &str,
        include_retired: bool,
    ) -> Result<Vec<TaskRecord>> {
        self.inner.list_tasks_for_note(note_id, include_retired).await
    }

    async fn update_task_metadata(
        &self,
        id: Uuid,
        update: &UpdateTaskMetadata,
    ) -> Result<Option<TaskRecord>> {
        self.inner.update_task_metadata(id, update).await
    }
}

/// In-memory store whose applies block until released.
///
/// Tracks how many applies are inside the store at once.
pub struct GatedStore {
    inner: InMemoryTaskStore,
    gate: Semaphore,
    entered: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for GatedStore {
    fn default() -> Self {
        Self {
            inner: InMemoryTaskStore::new(),
            gate: Semaphore::new(0),
            entered: Notify::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl GatedStore {
    pub fn inner(&self) -> &InMemoryTaskStore {
        &self.inner
    }

    /// Resolve once an apply is blocked at the gate
    pub async fn wait_until_apply_entered(&self) {
        let notified = self.entered.notified();
        if self.applies_in_flight() > 0 {
            return;
        }
        notified.await;
    }

    /// Let every current and future apply through
    pub fn release_all(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn applies_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_applies(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for GatedStore {
    async fn get_active_tasks_for_note(&self, note_id: &str) -> Result<Vec<TaskRecord>> {
        self.inner.get_active_tasks_for_note(note_id).await
    }

    async fn apply_operations(&self, note_id: &str, operations: &[TaskOperation]) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.entered.notify_waiters();

        let permit = self.gate.acquire().await?;
        permit.forget();
        let result = self.inner.apply_operations(note_id, operations).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>> {
        self.inner.get_task(id).await
    }

    async fn list_tasks_for_note(
        &self,
        note_id: &str,
        include_retired: bool,
    ) -> Result<Vec<TaskRecord>> {
        self.inner.list_tasks_for_note(note_id, include_retired).await
    }

    async fn update_task_metadata(
        &self,
        id: Uuid,
        update: &UpdateTaskMetadata,
    ) -> Result<Option<TaskRecord>> {
        self.inner.update_task_metadata(id, update).await
    }
}
