//! Space-delimited scope strings (RFC 6749 section 3.3).
//!
//! Scopes are handled purely as sets. Order and duplicates in the wire form
//! carry no meaning.

use std::collections::BTreeSet;

/// Splits a `scope` parameter into a set. Blank input yields an empty set.
#[must_use]
pub fn parse_scope(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Joins a scope set into its wire form (sorted, single spaces).
#[must_use]
pub fn format_scope(scopes: &BTreeSet<String>) -> String {
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collapses_whitespace_and_duplicates() {
        let scopes = parse_scope("  profile openid\tprofile ");
        assert_eq!(scopes.len(), 2);
        assert_eq!(format_scope(&scopes), "openid profile");
    }

    #[test]
    fn test_blank_scope_is_empty() {
        assert!(parse_scope("").is_empty());
        assert!(parse_scope("   ").is_empty());
        assert_eq!(format_scope(&BTreeSet::new()), "");
    }
}
