//! Checklist extraction
//!
//! Reads checkbox lines (`- [ ] text`, `* [x] text`, `1. [ ] text`) out of a
//! free-form note body. Indentation expresses nesting; everything that is not
//! a checkbox line is prose and is skipped without affecting the result.

use super::models::{ChecklistCandidate, Extraction, ExtractionIssue};
use super::normalize::normalize_line;

/// Columns a tab counts for when measuring indentation
const TAB_WIDTH: usize = 4;

/// Outcome of looking at a single line
#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    Prose,
    Item {
        indent: usize,
        completed: bool,
        text: &'a str,
    },
    Malformed(MalformedReason),
}

#[derive(Debug, PartialEq, Eq)]
enum MalformedReason {
    EmptyText,
    UnknownMarker(char),
}

/// Extract ordered checklist candidates from a note body.
///
/// Total: any input yields a (possibly empty) candidate list. Lines inside
/// fenced code blocks are never candidates.
pub fn extract_checklist(body: &str) -> Extraction {
    let mut extraction = Extraction::default();
    // Open ancestors as (indent, candidate index), innermost last
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut fence: Option<char> = None;

    for (idx, line) in body.lines().enumerate() {
        let line_number = idx + 1;

        if let Some(marker) = fence_marker(line) {
            match fence {
                Some(open_marker) if open_marker == marker => fence = None,
                Some(_) => {}
                None => fence = Some(marker),
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }

        match classify_line(line) {
            LineKind::Prose => {}
            LineKind::Malformed(reason) => {
                let issue = match reason {
                    MalformedReason::EmptyText => ExtractionIssue::EmptyText { line_number },
                    MalformedReason::UnknownMarker(marker) => ExtractionIssue::UnknownMarker {
                        line_number,
                        marker,
                    },
                };
                tracing::debug!(%issue, "Skipping malformed checklist line");
                extraction.issues.push(issue);
            }
            LineKind::Item {
                indent,
                completed,
                text,
            } => {
                while open.last().is_some_and(|&(w, _)| w >= indent) {
                    open.pop();
                }

                let position = extraction.candidates.len();
                extraction.candidates.push(ChecklistCandidate {
                    raw_text: text.to_string(),
                    canonical_text: normalize_line(text),
                    completed,
                    depth: open.len() as u32,
                    parent_index: open.last().map(|&(_, parent)| parent),
                    position,
                    line_number,
                });
                open.push((indent, position));
            }
        }
    }

    extraction
}

/// Returns the fence character if the line opens or closes a code fence
fn fence_marker(line: &str) -> Option<char> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

fn classify_line(line: &str) -> LineKind<'_> {
    let line = line.trim_end_matches('\r');

    let mut indent = 0;
    let mut rest = line;
    for (i, c) in line.char_indices() {
        match c {
            ' ' => indent += 1,
            '\t' => indent += TAB_WIDTH,
            _ => {
                rest = &line[i..];
                break;
            }
        }
    }

    let Some(after_bullet) = strip_bullet(rest) else {
        return LineKind::Prose;
    };

    // At least one space between bullet and box
    let after_gap = after_bullet.trim_start_matches([' ', '\t']);
    if after_gap.len() == after_bullet.len() {
        return LineKind::Prose;
    }

    let mut chars = after_gap.chars();
    if chars.next() != Some('[') {
        return LineKind::Prose;
    }
    let Some(marker) = chars.next() else {
        return LineKind::Prose;
    };
    if chars.next() != Some(']') {
        return LineKind::Prose;
    }
    let after_box = chars.as_str();

    // "- [x](url)" is a link, not a box
    if !after_box.is_empty() && !after_box.starts_with(char::is_whitespace) {
        return LineKind::Prose;
    }

    let completed = match marker {
        ' ' => false,
        'x' | 'X' => true,
        other => return LineKind::Malformed(MalformedReason::UnknownMarker(other)),
    };

    let text = after_box.trim();
    if text.is_empty() {
        return LineKind::Malformed(MalformedReason::EmptyText);
    }

    LineKind::Item {
        indent,
        completed,
        text,
    }
}

/// Strip a list bullet (`-`, `*`, `+`, `1.`, `1)`) from the start of `s`
fn strip_bullet(s: &str) -> Option<&str> {
    if let Some(rest) = s.strip_prefix(['-', '*', '+']) {
        return Some(rest);
    }

    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 || digits > 9 {
        return None;
    }
    s[digits..].strip_prefix(['.', ')'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(extraction: &Extraction) -> Vec<&str> {
        extraction
            .candidates
            .iter()
            .map(|c| c.raw_text.as_str())
            .collect()
    }

    #[test]
    fn test_extract_nested_example() {
        let body = "- [ ] Buy milk\n  - [ ] 2% milk\n- [x] Pay rent";
        let extraction = extract_checklist(body);
        let c = &extraction.candidates;

        assert_eq!(c.len(), 3);
        assert_eq!(c[0].raw_text, "Buy milk");
        assert_eq!(c[0].depth, 0);
        assert_eq!(c[0].parent_index, None);
        assert!(!c[0].completed);

        assert_eq!(c[1].raw_text, "2% milk");
        assert_eq!(c[1].depth, 1);
        assert_eq!(c[1].parent_index, Some(0));

        assert_eq!(c[2].raw_text, "Pay rent");
        assert_eq!(c[2].depth, 0);
        assert_eq!(c[2].parent_index, None);
        assert!(c[2].completed);
        assert!(extraction.issues.is_empty());
    }

    #[test]
    fn test_position_ignores_prose_lines() {
        let a = extract_checklist("- [ ] one\n- [ ] two");
        let b = extract_checklist("Intro\n\n- [ ] one\nSome prose\n- [ ] two");

        let pos = |e: &Extraction| e.candidates.iter().map(|c| c.position).collect::<Vec<_>>();
        assert_eq!(pos(&a), vec![0, 1]);
        assert_eq!(pos(&b), vec![0, 1]);
        assert_eq!(b.candidates[1].line_number, 5);
    }

    #[test]
    fn test_bullet_variants() {
        let body = "* [ ] star\n+ [X] plus\n1. [ ] numbered\n2) [x] paren";
        let extraction = extract_checklist(body);
        assert_eq!(texts(&extraction), vec!["star", "plus", "numbered", "paren"]);
        let done: Vec<bool> = extraction.candidates.iter().map(|c| c.completed).collect();
        assert_eq!(done, vec![false, true, false, true]);
    }

    #[test]
    fn test_plain_bullets_and_links_are_prose() {
        let body = "- plain item\n- [link](http://x)\n- [x](http://y)\n[ ] no bullet\n-[ ] no gap";
        let extraction = extract_checklist(body);
        assert!(extraction.is_empty());
        assert!(extraction.issues.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_reported_not_fatal() {
        let body = "- [ ]\n- [-] cancelled\n- [ ] real";
        let extraction = extract_checklist(body);
        assert_eq!(texts(&extraction), vec!["real"]);
        assert_eq!(
            extraction.issues,
            vec![
                ExtractionIssue::EmptyText { line_number: 1 },
                ExtractionIssue::UnknownMarker {
                    line_number: 2,
                    marker: '-'
                },
            ]
        );
        assert_eq!(extraction.candidates[0].position, 0);
    }

    #[test]
    fn test_fenced_code_is_skipped() {
        let body = "- [ ] before\n```\n- [ ] inside code\n```\n~~~md\n- [x] also code\n~~~\n- [ ] after";
        let extraction = extract_checklist(body);
        assert_eq!(texts(&extraction), vec!["before", "after"]);
    }

    #[test]
    fn test_mismatched_fence_does_not_close() {
        let body = "```\n~~~\n- [ ] still code\n```\n- [ ] out";
        assert_eq!(texts(&extract_checklist(body)), vec!["out"]);
    }

    #[test]
    fn test_parent_is_nearest_shallower_candidate() {
        let body = "- [ ] a\n    - [ ] b\n  - [ ] c\n      - [ ] d\n- [ ] e";
        let c = extract_checklist(body).candidates;
        // c is shallower than b but deeper than a
        assert_eq!(c[1].parent_index, Some(0));
        assert_eq!(c[2].parent_index, Some(0));
        assert_eq!(c[2].depth, 1);
        assert_eq!(c[3].parent_index, Some(2));
        assert_eq!(c[3].depth, 2);
        assert_eq!(c[4].parent_index, None);
    }

    #[test]
    fn test_tabs_and_crlf() {
        let body = "- [ ] top\r\n\t- [x] child\r\n";
        let c = extract_checklist(body).candidates;
        assert_eq!(c.len(), 2);
        assert_eq!(c[1].raw_text, "child");
        assert_eq!(c[1].parent_index, Some(0));
        assert!(c[1].completed);
    }

    #[test]
    fn test_canonical_text_is_normalized() {
        let c = extract_checklist("- [ ]   Review    PR  ").candidates;
        assert_eq!(c[0].raw_text, "Review    PR");
        assert_eq!(c[0].canonical_text, "review pr");
    }

    #[test]
    fn test_empty_body() {
        assert!(extract_checklist("").is_empty());
        assert!(extract_checklist("\n\n   \n").is_empty());
    }
}
