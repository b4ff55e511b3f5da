//! Content fingerprints for checklist items
//!
//! Generates stable hashes that identify a checklist line by what it says,
//! not where it sits in the note. Inputs are expected to be canonical text
//! (see [`super::normalize_line`]) so formatting changes never move a hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Namespace for debugging identities (UUIDv5).
const IDENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d7_4b0a_8e55_1d2c_7b9f_0a31);

/// Hex-encoded SHA-256 of (note id, canonical text).
///
/// Not unique within a note: repeated text yields the same fingerprint and
/// is told apart by its occurrence ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hex digest (e.g. read back from storage)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a checklist item's canonical text within a note.
///
/// The note id is length-prefixed so `("a", "bc")` and `("ab", "c")`
/// hash differently.
pub fn fingerprint(note_id: &str, canonical_text: &str) -> Fingerprint {
    let mut hasher = Sha256::new();

    hasher.update(b"note:");
    hasher.update((note_id.len() as u64).to_be_bytes());
    hasher.update(note_id.as_bytes());
    hasher.update(b"item:");
    hasher.update(canonical_text.as_bytes());

    Fingerprint(hex::encode(hasher.finalize()))
}

/// Deterministic identity for (note, fingerprint, ordinal).
///
/// For logs and debugging only. Record ids are random and assigned once at
/// creation; matching goes through (fingerprint, ordinal), never through
/// this value.
pub fn identity(note_id: &str, fingerprint: &Fingerprint, ordinal: u32) -> Uuid {
    let name = format!("{}\u{1f}{}\u{1f}{}", note_id, fingerprint, ordinal);
    Uuid::new_v5(&IDENTITY_NAMESPACE, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::normalize_line;

    #[test]
    fn test_fingerprint_same_text_same_note() {
        let a = fingerprint("note-1", "buy milk");
        let b = fingerprint("note-1", "buy milk");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_across_notes() {
        assert_ne!(
            fingerprint("note-1", "buy milk"),
            fingerprint("note-2", "buy milk")
        );
    }

    #[test]
    fn test_fingerprint_differs_across_text() {
        assert_ne!(
            fingerprint("note-1", "buy milk"),
            fingerprint("note-1", "buy bread")
        );
    }

    #[test]
    fn test_fingerprint_note_boundary_is_unambiguous() {
        assert_ne!(fingerprint("a", "bc"), fingerprint("ab", "c"));
    }

    #[test]
    fn test_fingerprint_formatting_independent_after_normalize() {
        let a = fingerprint("n", &normalize_line("  Review   PR"));
        let b = fingerprint("n", &normalize_line("review pr"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_is_deterministic_per_ordinal() {
        let fp = fingerprint("n", "x");
        assert_eq!(identity("n", &fp, 0), identity("n", &fp, 0));
        assert_ne!(identity("n", &fp, 0), identity("n", &fp, 1));
    }

    #[test]
    fn test_fingerprint_serializes_as_plain_string() {
        let fp = Fingerprint::from_hex("abc123");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"abc123\"");
        assert_eq!(fp.short(), "abc123");
    }

    #[test]
    fn test_short_tolerates_non_hex_storage() {
        // Byte 12 falls inside the sixth 'é'
        let fp = Fingerprint::from_hex("aéééééééé");
        assert_eq!(fp.short(), "aéééééééé");
        assert_eq!(fingerprint("n", "x").short().len(), 12);
    }
}
