//! Event bus for broadcasting sync runs to live observers

use super::{SyncEvent, SyncEventKind};
use crate::notes::Fingerprint;
use crate::sync::{MetricsSink, SyncCounts, SyncStartMetadata};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Metrics sink that distributes SyncEvents via `tokio::sync::broadcast`
///
/// Fire-and-forget: emitting never blocks, never panics.
/// If no subscribers are connected, events are silently dropped.
#[derive(Debug, Clone)]
pub struct SyncEventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn emit(&self, event: SyncEvent) {
        let run_id = event.run_id;
        if let Ok(n) = self.sender.send(event) {
            debug!(run_id = %run_id, subscribers = n, "SyncEvent emitted");
        }
    }
}

impl MetricsSink for SyncEventBus {
    fn record_sync_start(&self, run_id: Uuid, note_id: &str, metadata: &SyncStartMetadata) {
        self.emit(SyncEvent::new(
            run_id,
            SyncEventKind::Started {
                note_id: note_id.to_string(),
                generation: metadata.generation,
                coalesced_requests: metadata.coalesced_requests,
            },
        ));
    }

    fn record_duplicate_group(
        &self,
        run_id: Uuid,
        note_id: &str,
        fingerprint: &Fingerprint,
        count: usize,
    ) {
        self.emit(SyncEvent::new(
            run_id,
            SyncEventKind::DuplicateGroup {
                note_id: note_id.to_string(),
                fingerprint: fingerprint.clone(),
                count,
            },
        ));
    }

    fn record_sync_end(&self, run_id: Uuid, success: bool, counts: &SyncCounts) {
        self.emit(SyncEvent::new(
            run_id,
            SyncEventKind::Finished {
                success,
                counts: *counts,
            },
        ));
    }
}

impl Default for SyncEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
