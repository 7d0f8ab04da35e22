//! Table name sanitization
//!
//! Maps user-supplied file stems and sheet names onto identifiers SQLite
//! accepts without quoting: lowercase ASCII letters, digits and underscores,
//! never starting with a digit, never empty.
//!
//! Sanitization is not injective. `"Sheet 1"` and `"sheet-1"` both become
//! `sheet_1`, and the later relation replaces the earlier one at write time.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Prefix applied when a sanitized name would start with a digit
pub const DIGIT_PREFIX: &str = "t_";

/// Name used when nothing survives sanitization
pub const FALLBACK_TABLE_NAME: &str = "table1";

static INVALID_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-z_]+").expect("static pattern"));

/// Turn an arbitrary string into a safe SQL table name.
///
/// Surrounding whitespace is dropped, the rest is lowercased and every run of
/// characters outside `[0-9a-z_]` collapses to a single `_`.
pub fn sanitize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut name = INVALID_RUN.replace_all(&lowered, "_").into_owned();

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, DIGIT_PREFIX);
    }

    if name.is_empty() {
        FALLBACK_TABLE_NAME.to_string()
    } else {
        name
    }
}

/// Check whether `name` is already a valid table identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Make column names unique by suffixing repeats with `_duplicated_<n>`
///
/// SQL results such as `SELECT a.id, b.id` and spreadsheet headers both
/// repeat names, while DataFrames require distinct ones.
pub fn dedup_column_names(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 0;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_duplicated_{}", name, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize("2024 Sales"), "t_2024_sales");
        assert_eq!(sanitize("Customers"), "customers");
        assert_eq!(sanitize("Q1 -- Revenue (EUR)"), "q1_revenue_eur_");
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize("a   b"), "a_b");
        assert_eq!(sanitize("a!@#b"), "a_b");
        assert_eq!(sanitize("a__b"), "a__b");
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize("  orders \t"), "orders");
    }

    #[test]
    fn test_sanitize_non_ascii() {
        assert_eq!(sanitize("Café Ümlaut"), "caf_mlaut");
        assert_eq!(sanitize("数据"), "_");
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize(""), FALLBACK_TABLE_NAME);
        assert_eq!(sanitize("   "), FALLBACK_TABLE_NAME);
    }

    #[test]
    fn test_sanitize_leading_digit() {
        assert_eq!(sanitize("1"), "t_1");
        assert_eq!(sanitize("9 lives"), "t_9_lives");
    }

    #[test]
    fn test_sheet_name_collision() {
        assert_eq!(sanitize("Sheet 1"), sanitize("sheet-1"));
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("sales"));
        assert!(is_valid_identifier("_x9"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("9x"));
        assert!(!is_valid_identifier("Sales"));
    }

    #[test]
    fn test_dedup_column_names() {
        let names = vec!["a".to_string(), "b".to_string(), "a".to_string(), "a".to_string()];
        assert_eq!(
            dedup_column_names(names),
            vec!["a", "b", "a_duplicated_0", "a_duplicated_1"]
        );
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_valid_identifier(s in ".*") {
            let name = sanitize(&s);
            prop_assert!(!name.is_empty());
            prop_assert!(is_valid_identifier(&name), "invalid identifier {:?}", name);
        }

        #[test]
        fn prop_sanitize_is_idempotent(s in ".*") {
            let once = sanitize(&s);
            prop_assert_eq!(sanitize(&once), once);
        }
    }
}
