//! Per-note synchronization coordinator.
//!
//! Serializes and coalesces sync requests so that each note has at most one
//! reconciliation in flight.
//!
//! ## Design
//!
//! One worker task per note id, spawned on the note's first request:
//! 1. `request_sync(note_id, body)` overwrites the note's pending request in a
//!    `watch` channel and returns immediately. Older pending bodies are
//!    replaced, never queued.
//! 2. The worker waits for a request, then keeps absorbing newer ones until
//!    `debounce` passes with no new request, or `max_wait` has passed since
//!    the first one.
//! 3. It runs extraction + reconciliation on the newest body. The store read
//!    and the apply both happen inside this run, and runs for one note never
//!    overlap. A panic inside a run is reported as a failed run.
//! 4. Requests arriving mid-run mark the channel changed, so the worker picks
//!    them up as one coalesced run once the current run has applied.
//! 5. A worker with no request for `idle_timeout` removes its own entry and
//!    exits; the next request for the note spawns a fresh one.
//!
//! Finished runs are published on a second `watch` channel; a [`SyncTicket`]
//! resolves with the first finished run that covers its request.
//!
//! ## Usage
//!
//! ```ignore
//! let coordinator = SyncCoordinator::new(store, sink, Duration::from_millis(300));
//! let ticket = coordinator.request_sync("note-1", body); // non-blocking
//! let run = ticket.wait().await?;
//! ```

use super::metrics::MetricsSink;
use super::models::{SyncCounts, SyncRun, SyncStartMetadata};
use super::reconcile::ReconciliationEngine;
use crate::error::SyncError;
use crate::notes::extract_checklist;
use crate::tasks::TaskStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Upper bound on how long debouncing may hold back a run
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2);

/// How long an idle note worker stays alive
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

type NoteSlots = DashMap<String, NoteSlot>;

/// Latest request for a note
#[derive(Debug, Clone, Default)]
struct PendingRequest {
    generation: u64,
    body: String,
}

/// Worker handle for one note
struct NoteSlot {
    worker_id: u64,
    requests: watch::Sender<PendingRequest>,
    completed: watch::Receiver<Option<Arc<SyncRun>>>,
    worker: JoinHandle<()>,
}

impl NoteSlot {
    /// A request was made that no finished run covers yet
    fn has_pending_run(&self) -> bool {
        let requested = self.requests.borrow().generation;
        let finished = self
            .completed
            .borrow()
            .as_ref()
            .map_or(0, |run| run.generation);
        requested > finished
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    debounce: Duration,
    max_wait: Duration,
    idle_timeout: Duration,
}

/// State owned by one note worker
struct WorkerContext {
    engine: Arc<ReconciliationEngine>,
    sink: Arc<dyn MetricsSink>,
    timing: Timing,
    notes: Weak<NoteSlots>,
    note_id: String,
    worker_id: u64,
}

/// Handle to a pending sync request
#[derive(Debug)]
pub struct SyncTicket {
    note_id: String,
    generation: u64,
    completed: watch::Receiver<Option<Arc<SyncRun>>>,
}

impl SyncTicket {
    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    /// Per-note sequence number of the request
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the run that covers this request.
    ///
    /// If the request was superseded, this is the run of the newer body.
    /// A failed run is returned as-is; check [`SyncRun::is_success`].
    pub async fn wait(mut self) -> Result<Arc<SyncRun>, SyncError> {
        let generation = self.generation;
        let finished = self
            .completed
            .wait_for(|run| run.as_ref().is_some_and(|r| r.generation >= generation))
            .await
            .map_err(|_| SyncError::CoordinatorClosed)?;
        finished.clone().ok_or(SyncError::CoordinatorClosed)
    }
}

/// Serializes and coalesces sync runs per note
pub struct SyncCoordinator {
    engine: Arc<ReconciliationEngine>,
    sink: Arc<dyn MetricsSink>,
    timing: Timing,
    notes: Arc<NoteSlots>,
    next_worker_id: AtomicU64,
}

impl SyncCoordinator {
    /// Create a coordinator over `store`, reporting to `sink`.
    ///
    /// Workers are spawned on the current tokio runtime as notes are first
    /// requested.
    pub fn new(store: Arc<dyn TaskStore>, sink: Arc<dyn MetricsSink>, debounce: Duration) -> Self {
        Self {
            engine: Arc::new(ReconciliationEngine::new(store)),
            sink,
            timing: Timing {
                debounce,
                max_wait: DEFAULT_MAX_WAIT,
                idle_timeout: DEFAULT_IDLE_TIMEOUT,
            },
            notes: Arc::new(DashMap::new()),
            next_worker_id: AtomicU64::new(0),
        }
    }

    /// Cap on how long a stream of requests can postpone a run (builder pattern)
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.timing.max_wait = max_wait;
        self
    }

    /// How long a note worker lingers without requests (builder pattern)
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.timing.idle_timeout = idle_timeout;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.timing.debounce
    }

    /// Number of notes with a requested run that has not finished yet
    pub fn in_flight_notes(&self) -> usize {
        self.notes.iter().filter(|e| e.value().has_pending_run()).count()
    }

    /// Number of live note workers, idle ones included
    pub fn active_workers(&self) -> usize {
        self.notes.len()
    }

    /// Request synchronization of `note_id` against `body`.
    ///
    /// Non-blocking. The request replaces any request for the same note that
    /// has not started yet.
    pub fn request_sync(&self, note_id: &str, body: impl Into<String>) -> SyncTicket {
        let body = body.into();
        let mut slot = self
            .notes
            .entry(note_id.to_string())
            .or_insert_with(|| self.spawn_worker(note_id));

        if slot.worker.is_finished() {
            tracing::warn!(note_id = %note_id, "Sync worker gone, restarting");
            *slot = self.spawn_worker(note_id);
        }

        let mut generation = 0;
        slot.requests.send_modify(|pending| {
            pending.generation += 1;
            pending.body = body;
            generation = pending.generation;
        });

        tracing::trace!(note_id = %note_id, generation, "Sync requested");

        SyncTicket {
            note_id: note_id.to_string(),
            generation,
            completed: slot.completed.clone(),
        }
    }

    /// Request a sync and wait for the run that covers it.
    pub async fn sync_now(&self, note_id: &str, body: impl Into<String>) -> Result<SyncRun, SyncError> {
        let run = self.request_sync(note_id, body).wait().await?;
        match &run.error {
            None => Ok(run.as_ref().clone()),
            Some(message) => Err(SyncError::RunFailed {
                run_id: run.run_id,
                message: message.clone(),
            }),
        }
    }

    /// Stop all workers.
    ///
    /// A run already in progress finishes its apply first; a request still
    /// in its debounce window runs before the worker exits.
    pub async fn shutdown(&self) {
        let note_ids: Vec<String> = self.notes.iter().map(|e| e.key().clone()).collect();
        for note_id in note_ids {
            if let Some((_, slot)) = self.notes.remove(&note_id) {
                drop(slot.requests);
                if let Err(e) = slot.worker.await {
                    tracing::warn!(note_id = %note_id, "Sync worker ended abnormally: {}", e);
                }
            }
        }
    }

    fn spawn_worker(&self, note_id: &str) -> NoteSlot {
        let (request_tx, request_rx) = watch::channel(PendingRequest::default());
        let (completed_tx, completed_rx) = watch::channel(None);
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(note_id = %note_id, worker_id, "Starting sync worker");
        let context = WorkerContext {
            engine: self.engine.clone(),
            sink: self.sink.clone(),
            timing: self.timing,
            notes: Arc::downgrade(&self.notes),
            note_id: note_id.to_string(),
            worker_id,
        };
        let worker = tokio::spawn(run_loop(context, request_rx, completed_tx));

        NoteSlot {
            worker_id,
            requests: request_tx,
            completed: completed_rx,
            worker,
        }
    }
}

/// Background loop for one note: debounce requests and run them in order.
async fn run_loop(
    context: WorkerContext,
    mut requests: watch::Receiver<PendingRequest>,
    completed: watch::Sender<Option<Arc<SyncRun>>>,
) {
    let note_id = context.note_id.as_str();
    let timing = context.timing;
    let mut last_generation = 0;

    loop {
        // Wait for the first request, or retire when idle
        match tokio::time::timeout(timing.idle_timeout, requests.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => break, // coordinator dropped or shut down
            Err(_) => {
                if retire_if_idle(&context, last_generation) {
                    break;
                }
                continue; // a request slipped in
            }
        }

        // Debounce: absorb newer requests until a quiet period or the cap
        if !timing.debounce.is_zero() {
            let deadline = Instant::now() + timing.max_wait.max(timing.debounce);
            loop {
                let quiet = timing.debounce.min(deadline.saturating_duration_since(Instant::now()));
                if quiet.is_zero() {
                    break; // held back long enough
                }
                match tokio::time::timeout(quiet, requests.changed()).await {
                    Ok(Ok(())) => {}     // newer request, reset timer
                    Ok(Err(_)) => break, // closed: still run what is pending
                    Err(_) => break,     // quiet period elapsed
                }
            }
        }

        let PendingRequest { generation, body } = requests.borrow_and_update().clone();
        let coalesced = generation - last_generation;
        last_generation = generation;

        let run = guarded_run(&context, generation, coalesced, &body).await;
        completed.send_replace(Some(Arc::new(run)));
    }

    tracing::debug!(note_id = %note_id, worker_id = context.worker_id, "Sync worker stopped");
}

/// Remove this worker's entry unless a request arrived since the last run.
///
/// Checked under the map's shard lock, which `request_sync` also holds while
/// bumping the generation, so no request can be lost.
fn retire_if_idle(context: &WorkerContext, last_generation: u64) -> bool {
    let Some(notes) = context.notes.upgrade() else {
        return true;
    };
    notes
        .remove_if(&context.note_id, |_, slot| {
            slot.worker_id == context.worker_id
                && slot.requests.borrow().generation == last_generation
        })
        .is_some()
}

/// Run once, turning a panic in the store or sink into a failed run.
async fn guarded_run(
    context: &WorkerContext,
    generation: u64,
    coalesced_requests: u64,
    body: &str,
) -> SyncRun {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let outcome = AssertUnwindSafe(execute_run(
        context,
        run_id,
        started_at,
        generation,
        coalesced_requests,
        body,
    ))
    .catch_unwind()
    .await;

    match outcome {
        Ok(run) => run,
        Err(panic) => {
            let message = format!("sync run panicked: {}", panic_message(panic.as_ref()));
            tracing::error!(run_id = %run_id, note_id = %context.note_id, "{}", message);

            let counts = SyncCounts::default();
            let reported = std::panic::catch_unwind(AssertUnwindSafe(|| {
                context.sink.record_sync_end(run_id, false, &counts)
            }));
            if reported.is_err() {
                tracing::error!(run_id = %run_id, "Metrics sink panicked on sync end");
            }

            SyncRun {
                run_id,
                note_id: context.note_id.clone(),
                generation,
                coalesced_requests,
                started_at,
                ended_at: Utc::now(),
                counts,
                duplicate_groups: Vec::new(),
                error: Some(message),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// One serialized run: extract, read, diff, apply, report.
async fn execute_run(
    context: &WorkerContext,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    generation: u64,
    coalesced_requests: u64,
    body: &str,
) -> SyncRun {
    let note_id = context.note_id.as_str();

    context.sink.record_sync_start(
        run_id,
        note_id,
        &SyncStartMetadata {
            generation,
            coalesced_requests,
            body_bytes: body.len(),
        },
    );

    let extraction = extract_checklist(body);
    let skipped_lines = extraction.issues.len();

    let (counts, duplicate_groups, error) =
        match context.engine.reconcile(note_id, &extraction.candidates).await {
            Ok(plan) => {
                for group in &plan.duplicate_groups {
                    context
                        .sink
                        .record_duplicate_group(run_id, note_id, &group.fingerprint, group.count);
                }
                let counts = SyncCounts {
                    skipped_lines,
                    ..plan.counts
                };
                (counts, plan.duplicate_groups, None)
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, note_id = %note_id, "Sync run failed: {:#}", e);
                let counts = SyncCounts {
                    candidates: extraction.candidates.len(),
                    skipped_lines,
                    ..Default::default()
                };
                (counts, Vec::new(), Some(e.to_string()))
            }
        };

    context
        .sink
        .record_sync_end(run_id, error.is_none(), &counts);

    SyncRun {
        run_id,
        note_id: note_id.to_string(),
        generation,
        coalesced_requests,
        started_at,
        ended_at: Utc::now(),
        counts,
        duplicate_groups,
        error,
    }
}
