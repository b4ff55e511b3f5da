//! Sync event types for live observers

use crate::notes::Fingerprint;
use crate::sync::SyncCounts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened during a sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEventKind {
    Started {
        note_id: String,
        generation: u64,
        coalesced_requests: u64,
    },
    DuplicateGroup {
        note_id: String,
        fingerprint: Fingerprint,
        count: usize,
    },
    Finished {
        success: bool,
        counts: SyncCounts,
    },
}

/// An event broadcast while a sync run progresses
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub kind: SyncEventKind,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl SyncEvent {
    /// Create a new SyncEvent with the current timestamp
    pub fn new(run_id: Uuid, kind: SyncEventKind) -> Self {
        Self {
            run_id,
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Note the event belongs to, when the event carries it
    pub fn note_id(&self) -> Option<&str> {
        match &self.kind {
            SyncEventKind::Started { note_id, .. } | SyncEventKind::DuplicateGroup { note_id, .. } => {
                Some(note_id)
            }
            SyncEventKind::Finished { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat_with_kind_tag() {
        let event = SyncEvent::new(
            Uuid::nil(),
            SyncEventKind::Finished {
                success: true,
                counts: SyncCounts {
                    created: 2,
                    ..Default::default()
                },
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "finished");
        assert_eq!(json["success"], true);
        assert_eq!(json["counts"]["created"], 2);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_note_id_accessor() {
        let started = SyncEvent::new(
            Uuid::nil(),
            SyncEventKind::Started {
                note_id: "n".into(),
                generation: 1,
                coalesced_requests: 1,
            },
        );
        assert_eq!(started.note_id(), Some("n"));
    }
}
