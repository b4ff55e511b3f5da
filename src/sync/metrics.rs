//! Metrics sinks for sync runs
//!
//! The coordinator reports every run through an injected [`MetricsSink`]
//! instead of a process-wide collector, so runs for different notes never
//! share hidden state.

use super::models::{SyncCounts, SyncStartMetadata};
use crate::notes::Fingerprint;
use std::sync::Arc;
use uuid::Uuid;

/// Receiver of sync run observations.
///
/// Calls are made from the note's worker task and must not block.
pub trait MetricsSink: Send + Sync {
    fn record_sync_start(&self, run_id: Uuid, note_id: &str, metadata: &SyncStartMetadata);

    fn record_duplicate_group(
        &self,
        run_id: Uuid,
        note_id: &str,
        fingerprint: &Fingerprint,
        count: usize,
    );

    fn record_sync_end(&self, run_id: Uuid, success: bool, counts: &SyncCounts);
}

/// Sink that writes runs to the `tracing` log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record_sync_start(&self, run_id: Uuid, note_id: &str, metadata: &SyncStartMetadata) {
        tracing::info!(
            run_id = %run_id,
            note_id = %note_id,
            generation = metadata.generation,
            coalesced = metadata.coalesced_requests,
            body_bytes = metadata.body_bytes,
            "Sync run started"
        );
    }

    fn record_duplicate_group(
        &self,
        run_id: Uuid,
        note_id: &str,
        fingerprint: &Fingerprint,
        count: usize,
    ) {
        tracing::debug!(
            run_id = %run_id,
            note_id = %note_id,
            fingerprint = %fingerprint.short(),
            count,
            "Duplicate checklist text"
        );
    }

    fn record_sync_end(&self, run_id: Uuid, success: bool, counts: &SyncCounts) {
        if success {
            tracing::info!(
                run_id = %run_id,
                candidates = counts.candidates,
                created = counts.created,
                updated = counts.updated,
                retired = counts.retired,
                "Sync run finished"
            );
        } else {
            tracing::warn!(
                run_id = %run_id,
                candidates = counts.candidates,
                "Sync run failed"
            );
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_sync_start(&self, _: Uuid, _: &str, _: &SyncStartMetadata) {}
    fn record_duplicate_group(&self, _: Uuid, _: &str, _: &Fingerprint, _: usize) {}
    fn record_sync_end(&self, _: Uuid, _: bool, _: &SyncCounts) {}
}

/// Forwards every observation to several sinks, in order
#[derive(Clone, Default)]
pub struct FanoutMetricsSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutMetricsSink {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }

    /// Add a sink (builder pattern)
    pub fn with(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for FanoutMetricsSink {
    fn record_sync_start(&self, run_id: Uuid, note_id: &str, metadata: &SyncStartMetadata) {
        for sink in &self.sinks {
            sink.record_sync_start(run_id, note_id, metadata);
        }
    }

    fn record_duplicate_group(
        &self,
        run_id: Uuid,
        note_id: &str,
        fingerprint: &Fingerprint,
        count: usize,
    ) {
        for sink in &self.sinks {
            sink.record_duplicate_group(run_id, note_id, fingerprint, count);
        }
    }

    fn record_sync_end(&self, run_id: Uuid, success: bool, counts: &SyncCounts) {
        for sink in &self.sinks {
            sink.record_sync_end(run_id, success, counts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordedMetric, RecordingSink};

    #[test]
    fn test_fanout_forwards_to_all_sinks() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let fanout = FanoutMetricsSink::default()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(NoopMetricsSink));
        assert_eq!(fanout.len(), 3);

        let run_id = Uuid::new_v4();
        fanout.record_sync_start(run_id, "n", &SyncStartMetadata::default());
        fanout.record_sync_end(run_id, true, &SyncCounts::default());

        for sink in [&a, &b] {
            let events = sink.events();
            assert_eq!(events.len(), 2);
            assert!(matches!(events[0], RecordedMetric::Start { .. }));
            assert!(matches!(events[1], RecordedMetric::End { success: true, .. }));
        }
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        let sink = TracingMetricsSink;
        let run_id = Uuid::new_v4();
        sink.record_sync_start(run_id, "n", &SyncStartMetadata::default());
        sink.record_duplicate_group(run_id, "n", &crate::notes::fingerprint("n", "x"), 2);
        sink.record_sync_end(run_id, false, &SyncCounts::default());
    }
}
