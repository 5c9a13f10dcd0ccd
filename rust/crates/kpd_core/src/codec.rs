//! Path codec: classification code → hierarchical path.
//!
//! A path is the structural key every navigation query is built on. The
//! section letter is segment 1, the two-digit division is segment 2, and every
//! remaining digit becomes its own segment:
//!
//! ```text
//! A          → A                 (level 1)
//! A01        → A.01              (level 2)
//! A01.1      → A.01.1            (level 3)
//! A01.11.11  → A.01.1.1.1.1      (level 6)
//! ```
//!
//! Separator characters in the raw code carry no structure; only character
//! position inside the digit tail decides segmentation. The codec is total and
//! never inspects digit-ness, so `validate_level` is the gate every row must
//! pass before it is persisted.

use crate::error::PathError;

/// Delimiter between path segments.
pub const PATH_SEPARATOR: char = '.';

/// Characters dropped from the digit tail of a raw code.
const CODE_SEPARATORS: &[char] = &['.'];

/// Width of the second (division) segment.
const DIVISION_WIDTH: usize = 2;

/// Deepest level of the classification.
pub const MAX_LEVEL: u8 = 6;

/// Convert a raw classification code into its canonical path.
pub fn encode_path(code: &str) -> String {
    let code = code.trim();
    let mut chars = code.chars();

    let Some(section) = chars.next() else {
        return String::new();
    };

    let mut segments: Vec<String> = vec![section.to_string()];

    let division: String = chars.by_ref().take(DIVISION_WIDTH).collect();
    if division.is_empty() {
        return section.to_string();
    }
    segments.push(division);

    segments.extend(
        chars
            .filter(|c| !CODE_SEPARATORS.contains(c))
            .map(|c| c.to_string()),
    );

    segments.join(".")
}

/// Number of segments in a path. The empty path has none.
pub fn segment_count(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split(PATH_SEPARATOR).count()
    }
}

/// Check that a path has exactly `expected_level` segments.
pub fn validate_level(path: &str, expected_level: u8) -> Result<(), PathError> {
    let actual = segment_count(path);
    if actual == expected_level as usize {
        Ok(())
    } else {
        Err(PathError::LevelMismatch {
            expected: expected_level as usize,
            actual,
        })
    }
}

/// Parent of a path, or `None` for a root (single-segment) path.
pub fn parent_path(path: &str) -> Option<String> {
    path.rsplit_once(PATH_SEPARATOR)
        .map(|(parent, _)| parent.to_string())
}

/// Every ancestor path from the root down to the immediate parent.
///
/// Excludes `path` itself; empty for a root.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    (1..segments.len())
        .map(|depth| segments[..depth].join("."))
        .collect()
}

/// LIKE pattern matching every path strictly below `path`.
///
/// Matches all descendants; callers wanting immediate children must also
/// require `level == level_of(path) + 1`.
pub fn children_prefix(path: &str) -> String {
    format!("{path}{PATH_SEPARATOR}%")
}

/// How an external code should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    /// Starts with a section letter (`A01.11`).
    ByFullCode,
    /// Starts with a digit (`01.11`).
    ByOfficialCode,
    /// Anything else; resolves to not found.
    Invalid,
}

/// Pick the lookup strategy for an external code by its first character.
pub fn classify_code(code: &str) -> CodeKind {
    match code.trim().chars().next() {
        Some(c) if c.is_alphabetic() => CodeKind::ByFullCode,
        Some(c) if c.is_ascii_digit() => CodeKind::ByOfficialCode,
        _ => CodeKind::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_section_only() {
        assert_eq!(encode_path("A"), "A");
    }

    #[test]
    fn test_encode_division() {
        assert_eq!(encode_path("A01"), "A.01");
    }

    #[test]
    fn test_encode_deepest_level() {
        assert_eq!(encode_path("A01.11.11"), "A.01.1.1.1.1");
        assert_eq!(encode_path("C10.12.50"), "C.10.1.2.5.0");
    }

    #[test]
    fn test_encode_ignores_separator_placement() {
        assert_eq!(encode_path("C10.1250"), encode_path("C10.12.50"));
        assert_eq!(encode_path("C101250"), "C.10.1.2.5.0");
    }

    #[test]
    fn test_encode_trims_whitespace() {
        assert_eq!(encode_path("  A01.1 \t"), "A.01.1");
        assert_eq!(encode_path(" B "), "B");
    }

    #[test]
    fn test_encode_degenerate_inputs() {
        assert_eq!(encode_path(""), "");
        assert_eq!(encode_path("   "), "");
        assert_eq!(encode_path("A0"), "A.0");
        assert_eq!(encode_path("Č01.1"), "Č.01.1");
    }

    #[test]
    fn test_validate_level_ok() {
        assert!(validate_level("A", 1).is_ok());
        assert!(validate_level("A.01.1.1.1.1", 6).is_ok());
    }

    #[test]
    fn test_validate_level_message() {
        let err = validate_level("Z", 2).unwrap_err();
        assert_eq!(err.to_string(), "Level mismatch: expected 2 levels, got 1");

        let err = validate_level("A.01.1", 5).unwrap_err();
        assert_eq!(err.to_string(), "Level mismatch: expected 5 levels, got 3");
    }

    #[test]
    fn test_validate_level_empty_path() {
        let err = validate_level("", 1).unwrap_err();
        assert_eq!(err.to_string(), "Level mismatch: expected 1 levels, got 0");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("A.01.1.1").as_deref(), Some("A.01.1"));
        assert_eq!(parent_path("A.01").as_deref(), Some("A"));
        assert_eq!(parent_path("A"), None);
    }

    #[test]
    fn test_ancestor_paths() {
        assert_eq!(
            ancestor_paths("A.01.1.1.1.1"),
            vec!["A", "A.01", "A.01.1", "A.01.1.1", "A.01.1.1.1"]
        );
        assert!(ancestor_paths("A").is_empty());
    }

    #[test]
    fn test_children_prefix() {
        assert_eq!(children_prefix("A.01"), "A.01.%");
    }

    #[test]
    fn test_classify_code() {
        assert_eq!(classify_code("A01.11"), CodeKind::ByFullCode);
        assert_eq!(classify_code("01.11"), CodeKind::ByOfficialCode);
        assert_eq!(classify_code(" 01"), CodeKind::ByOfficialCode);
        assert_eq!(classify_code("-01"), CodeKind::Invalid);
        assert_eq!(classify_code(""), CodeKind::Invalid);
    }

    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        fn arb_code() -> impl Strategy<Value = (String, u8)> {
            ("[A-Z]", prop::collection::vec("[0-9]", 0..=6)).prop_map(|(section, digits)| {
                if digits.is_empty() {
                    return (section, 1);
                }
                let digits: Vec<String> = if digits.len() == 1 {
                    vec!["0".to_string(), digits[0].clone()]
                } else {
                    digits
                };
                let level = (digits.len() as u8).max(2);
                let tail: String = digits.concat();
                let mut code = format!("{section}{}", &tail[..2]);
                for (i, c) in tail[2..].chars().enumerate() {
                    if i % 2 == 0 {
                        code.push('.');
                    }
                    code.push(c);
                }
                (code, level)
            })
        }

        proptest! {
            #[test]
            fn encode_is_deterministic(code in "[A-Z][0-9.]{0,8}") {
                prop_assert_eq!(encode_path(&code), encode_path(&code));
            }

            #[test]
            fn encoded_level_agrees((code, level) in arb_code()) {
                let path = encode_path(&code);
                prop_assert!(validate_level(&path, level).is_ok(), "{} -> {}", code, path);
                prop_assert!(validate_level(&path, level + 1).is_err());
            }

            #[test]
            fn ancestors_chain_through_parents((code, _) in arb_code()) {
                let path = encode_path(&code);
                let ancestors = ancestor_paths(&path);
                prop_assert_eq!(ancestors.len() + 1, segment_count(&path));
                prop_assert_eq!(ancestors.last().cloned(), parent_path(&path));
                for pair in ancestors.windows(2) {
                    let parent = parent_path(&pair[1]);
                    prop_assert_eq!(parent.as_deref(), Some(pair[0].as_str()));
                }
            }

            #[test]
            fn encode_never_panics(code in "\\PC{0,16}") {
                let _ = encode_path(&code);
            }
        }
    }
}
