//! Sync event broadcasting
//!
//! This module provides:
//! - `SyncEvent` - typed events emitted as a sync run progresses
//! - `SyncEventBus` - broadcast channel that doubles as a metrics sink

mod bus;
mod types;

pub use bus::SyncEventBus;
pub use types::{SyncEvent, SyncEventKind};
