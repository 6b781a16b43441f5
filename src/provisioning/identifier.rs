//! # Identifier Sanitizer
//!
//! Turns arbitrary strings into server object names: upper case,
//! `A-Z 0-9 _ $ #` only, leading letter.

use serde::{Deserialize, Serialize};

/// Prefix prepended when the first character is not a letter
pub const FILLER_PREFIX: &str = "U_";

/// Identifier length ceiling on current server generations
pub const MODERN_IDENTIFIER_LIMIT: usize = 128;

/// Identifier length ceiling on older server generations
pub const LEGACY_IDENTIFIER_LIMIT: usize = 30;

/// Identifier length ceilings, tried in order by the retry ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierLimits {
    #[serde(default = "default_modern")]
    pub modern: usize,
    #[serde(default = "default_legacy")]
    pub legacy: usize,
}

fn default_modern() -> usize {
    MODERN_IDENTIFIER_LIMIT
}

fn default_legacy() -> usize {
    LEGACY_IDENTIFIER_LIMIT
}

impl Default for IdentifierLimits {
    fn default() -> Self {
        Self {
            modern: MODERN_IDENTIFIER_LIMIT,
            legacy: LEGACY_IDENTIFIER_LIMIT,
        }
    }
}

impl IdentifierLimits {
    /// Caps in the order they are applied
    pub fn ladder(&self) -> [usize; 2] {
        [self.modern, self.legacy]
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | '$' | '#')
}

/// Sanitize `input` into an identifier. Total; the empty string stays empty.
pub fn sanitize(input: &str) -> String {
    let mut out: String = input
        .to_uppercase()
        .chars()
        .map(|c| if is_allowed(c) { c } else { '_' })
        .collect();

    if let Some(first) = out.chars().next() {
        if !first.is_ascii_uppercase() {
            out.insert_str(0, FILLER_PREFIX);
        }
    }
    out
}

/// First `max` characters of `identifier`
pub fn truncate(identifier: &str, max: usize) -> String {
    identifier.chars().take(max).collect()
}

/// Whether `identifier` is non-empty and already sanitized
pub fn is_valid(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => chars.all(is_allowed),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize("user_slash_schema"), "USER_SLASH_SCHEMA");
        assert_eq!(sanitize("pdb-2025.08"), "PDB_2025_08");
        assert_eq!(sanitize("2025_08_04"), "U_2025_08_04");
        assert_eq!(sanitize("_x"), "U__X");
        assert_eq!(sanitize("a b$c#d"), "A_B$C#D");
        assert_eq!(sanitize("é"), "U__");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn test_valid_identifier_unchanged() {
        for id in ["SYS", "USER_SLASH_SCHEMA_20250804", "A$B#C_1"] {
            assert!(is_valid(id));
            assert_eq!(sanitize(id), id);
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("ABCDEF", 3), "ABC");
        assert_eq!(truncate("ABC", 30), "ABC");
    }

    #[test]
    fn test_is_valid() {
        assert!(!is_valid(""));
        assert!(!is_valid("1ABC"));
        assert!(!is_valid("abc"));
        assert!(!is_valid("AB-C"));
    }

    #[test]
    fn test_limits_default() {
        let limits = IdentifierLimits::default();
        assert_eq!(limits.ladder(), [128, 30]);
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(input in ".*") {
            let once = sanitize(&input);
            prop_assert_eq!(sanitize(&once), once);
        }

        #[test]
        fn prop_sanitized_is_valid_or_empty(input in ".*") {
            let out = sanitize(&input);
            prop_assert!(out.is_empty() == input.is_empty());
            if !out.is_empty() {
                prop_assert!(is_valid(&out));
            }
        }
    }
}
