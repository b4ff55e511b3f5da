//! Checklist models
//!
//! Candidates are what the extractor reads out of a note body on one run.
//! They live only until reconciliation has turned them into task operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A checkbox line found in a note body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistCandidate {
    /// Item text as written, marker and surrounding whitespace stripped
    pub raw_text: String,
    /// Normalized form of `raw_text`, the fingerprint input
    pub canonical_text: String,
    /// Whether the box is checked
    pub completed: bool,
    /// Nesting depth (0 = top level)
    pub depth: u32,
    /// Index of the parent candidate in the same extraction
    pub parent_index: Option<usize>,
    /// Index within the candidate list
    pub position: usize,
    /// 1-based line in the body. Diagnostic only: unrelated prose edits move
    /// it, so identity and ordering never depend on it.
    pub line_number: usize,
}

/// Why a checkbox-looking line was not turned into a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionIssue {
    /// `- [ ]` with nothing after the box
    EmptyText { line_number: usize },
    /// A box holding something other than space, `x` or `X`
    UnknownMarker { line_number: usize, marker: char },
}

impl ExtractionIssue {
    pub fn line_number(&self) -> usize {
        match self {
            Self::EmptyText { line_number } | Self::UnknownMarker { line_number, .. } => {
                *line_number
            }
        }
    }
}

impl fmt::Display for ExtractionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyText { line_number } => {
                write!(f, "line {}: checkbox has no text", line_number)
            }
            Self::UnknownMarker {
                line_number,
                marker,
            } => write!(f, "line {}: unknown checkbox marker '{}'", line_number, marker),
        }
    }
}

/// Result of extracting a note body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub candidates: Vec<ChecklistCandidate>,
    /// Skipped lines. Never fatal: a malformed line only means one fewer
    /// candidate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ExtractionIssue>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
