//! Note-to-task synchronization
//!
//! - `reconcile` - pure diff of extracted candidates against stored records
//! - `coordinator` - per-note serialization, debounce, and coalescing of runs
//! - `metrics` - injected sinks that observe each run

pub mod coordinator;
pub mod metrics;
pub mod models;
pub mod reconcile;

pub use coordinator::{SyncCoordinator, SyncTicket};
pub use metrics::{FanoutMetricsSink, MetricsSink, NoopMetricsSink, TracingMetricsSink};
pub use models::*;
pub use reconcile::{plan_reconciliation, ReconcilePlan, ReconciliationEngine};
