//! Canonical form of checklist text
//!
//! Two lines that differ only in surrounding whitespace, internal whitespace
//! runs or letter case describe the same task, so they must normalize to the
//! same string before fingerprinting.

/// Normalize a line of checklist text.
///
/// Trims, collapses every run of whitespace to a single space and lowercases.
pub fn normalize_line(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space && !result.is_empty() {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            result.extend(c.to_lowercase());
            last_was_space = false;
        }
    }

    // A trailing run leaves one pending space behind
    if result.ends_with(' ') {
        result.pop();
    }

    result
}
