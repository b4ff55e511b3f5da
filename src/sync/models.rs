//! Sync run models
//!
//! Observability records for one reconciliation pass over a note.

use crate::notes::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text that appears more than once among a note's checklist items.
///
/// Legal: each occurrence is its own task. Reported for observability only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub fingerprint: Fingerprint,
    pub count: usize,
}

/// Context reported when a run starts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStartMetadata {
    /// Request generation the run covers
    pub generation: u64,
    /// Requests folded into this run (1 = no coalescing)
    pub coalesced_requests: u64,
    pub body_bytes: usize,
}

/// Tallies of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub candidates: usize,
    pub created: usize,
    pub updated: usize,
    /// Matched records that needed no change
    pub unchanged: usize,
    pub retired: usize,
    pub duplicate_groups: usize,
    /// Malformed checklist lines skipped by extraction
    pub skipped_lines: usize,
}

impl SyncCounts {
    /// Number of operations sent to the store
    pub fn operations(&self) -> usize {
        self.created + self.updated + self.retired
    }
}

/// One finished synchronization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub run_id: Uuid,
    pub note_id: String,
    /// Highest request generation the run covered
    pub generation: u64,
    pub coalesced_requests: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub counts: SyncCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_groups: Vec<DuplicateGroup>,
    /// Set when the run failed; nothing was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncRun {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}
