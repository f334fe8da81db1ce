//! Snapshot diffing - the fallback change extractor
//!
//! Turns a before/after pair of document snapshots into at most one
//! positional insert-or-delete. This is the fallback path for editing
//! surfaces that only report "something changed": the hypothesis is a single
//! contiguous edit region, found by matching the common prefix and suffix.
//!
//! Surfaces that report structured per-edit ranges bypass this entirely
//! (see the session's change-range path); the heuristic cannot separate two
//! simultaneous edit regions, and by construction it cannot see a
//! same-length replacement at all.

use crate::operation::OpKind;

/// A single extracted edit, positions in character offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
    pub kind: OpKind,
    pub position: usize,
    pub text: String,
}

/// Extract the minimal single edit between two snapshots.
///
/// Returns `None` when the texts are identical after normalization, and also
/// for equal-length differing texts (the known blind spot of this path).
pub fn extract(old_text: &str, new_text: &str) -> Option<DiffResult> {
    // Editing surfaces render runs of spaces as non-breaking spaces; collapse
    // them so the diff is not polluted by the rendering substitution.
    let old = normalize(old_text);
    let new = normalize(new_text);

    if new.len() > old.len() {
        Some(single_region(&old, &new, OpKind::Insert))
    } else if new.len() < old.len() {
        Some(single_region(&new, &old, OpKind::Delete))
    } else {
        None
    }
}

fn normalize(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect()
}

/// Locate the edit region of `longer` relative to `shorter`.
///
/// `start` is the common-prefix boundary. A single contiguous edit forces the
/// region end to `start + (longer - shorter)`; if the suffixes disagree there,
/// the single-region hypothesis failed and everything from `start` onward is
/// reported instead.
fn single_region(shorter: &[char], longer: &[char], kind: OpKind) -> DiffResult {
    let start = shorter
        .iter()
        .zip(longer.iter())
        .position(|(a, b)| a != b)
        .unwrap_or(shorter.len());

    let candidate = start + (longer.len() - shorter.len());
    let end = if longer[candidate..] == shorter[start..] {
        candidate
    } else {
        longer.len()
    };

    DiffResult {
        kind,
        position: start,
        text: longer[start..end].iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(position: usize, text: &str) -> Option<DiffResult> {
        Some(DiffResult {
            kind: OpKind::Insert,
            position,
            text: text.into(),
        })
    }

    fn delete(position: usize, text: &str) -> Option<DiffResult> {
        Some(DiffResult {
            kind: OpKind::Delete,
            position,
            text: text.into(),
        })
    }

    #[test]
    fn test_insert_at_end() {
        assert_eq!(extract("hello", "helloX"), insert(5, "X"));
    }

    #[test]
    fn test_insert_in_middle() {
        assert_eq!(extract("hello", "heXllo"), insert(2, "X"));
    }

    #[test]
    fn test_insert_at_start() {
        assert_eq!(extract("hello", "Xhello"), insert(0, "X"));
    }

    #[test]
    fn test_insert_into_empty() {
        assert_eq!(extract("", "foo"), insert(0, "foo"));
    }

    #[test]
    fn test_insert_repeated_char() {
        assert_eq!(extract("aa", "aaa"), insert(2, "a"));
    }

    #[test]
    fn test_delete_at_end() {
        assert_eq!(extract("hello", "hell"), delete(4, "o"));
    }

    #[test]
    fn test_delete_word() {
        assert_eq!(extract("hello world", "hello"), delete(5, " world"));
    }

    #[test]
    fn test_delete_at_start() {
        assert_eq!(extract("hello", "ello"), delete(0, "h"));
    }

    #[test]
    fn test_delete_to_empty() {
        assert_eq!(extract("abc", ""), delete(0, "abc"));
    }

    #[test]
    fn test_identity_is_none() {
        assert_eq!(extract("", ""), None);
        assert_eq!(extract("hello", "hello"), None);
    }

    #[test]
    fn test_same_length_blind_spot() {
        // Equal-length replacement is not detected; documented limitation of
        // the fallback path.
        assert_eq!(extract("hello", "hexlo"), None);
    }

    #[test]
    fn test_nbsp_normalized_before_compare() {
        assert_eq!(extract("a\u{00A0}b", "a b"), None);
        assert_eq!(extract("a\u{00A0}b", "a bc"), insert(3, "c"));
    }

    #[test]
    fn test_multi_region_collapses_to_remainder() {
        // Two simultaneous insertions defeat the single-region hypothesis;
        // the heuristic reports everything from the first difference.
        assert_eq!(extract("abc", "aXbYc"), insert(1, "XbYc"));
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        assert_eq!(extract("héllo", "héllXo"), insert(4, "X"));
    }
}
