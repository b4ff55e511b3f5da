//! Structured task store
//!
//! This module provides:
//! - `TaskStore` - the store interface the synchronization engine consumes
//! - `InMemoryTaskStore` / `JsonFileTaskStore` - shipped implementations
//! - `TaskManager` - user-owned fields (priority, due date, labels) and the
//!   reminder bridge

pub mod file;
pub mod manager;
pub mod memory;
pub mod models;
pub mod traits;

pub use file::JsonFileTaskStore;
pub use manager::{ReminderBridge, TaskManager};
pub use memory::InMemoryTaskStore;
pub use models::*;
pub use traits::TaskStore;
