//! Note-side processing
//!
//! Everything here is pure: reading checkbox lines out of a note body,
//! normalizing their text and fingerprinting it. No store access happens in
//! this module, so it can run outside a note's synchronization section.

pub mod checklist;
pub mod hashing;
pub mod models;
pub mod normalize;

pub use checklist::extract_checklist;
pub use hashing::{fingerprint, identity, Fingerprint};
pub use models::*;
pub use normalize::normalize_line;
