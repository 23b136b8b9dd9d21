//! Matching failed output against the table of known transient errors.

use std::collections::BTreeMap;

/// A table entry whose pattern occurs in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryableMatch<'a> {
    pub pattern: &'a str,
    pub explanation: &'a str,
}

/// Find the first table entry (in key order) whose pattern occurs in `output`.
///
/// Empty patterns never match.
pub fn find_retryable<'a>(
    table: &'a BTreeMap<String, String>,
    output: &str,
) -> Option<RetryableMatch<'a>> {
    table
        .iter()
        .filter(|(pattern, _)| !pattern.is_empty())
        .find(|(pattern, _)| output.contains(pattern.as_str()))
        .map(|(pattern, explanation)| RetryableMatch {
            pattern,
            explanation,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<String, String> {
        let mut table = BTreeMap::new();
        table.insert(
            "connection reset".to_string(),
            "transient network blip".to_string(),
        );
        table.insert("Error installing provider".to_string(), "registry".to_string());
        table
    }

    #[test]
    fn matches_substring_anywhere_in_output() {
        let output = "Initializing...\nError: read tcp: connection reset by peer\n";
        let table = table();
        let found = find_retryable(&table, output).expect("match");
        assert_eq!(found.pattern, "connection reset");
        assert_eq!(found.explanation, "transient network blip");
    }

    #[test]
    fn no_match_for_unrelated_output() {
        assert_eq!(find_retryable(&table(), "Error: invalid resource"), None);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(find_retryable(&table(), "CONNECTION RESET"), None);
    }

    #[test]
    fn empty_pattern_is_ignored() {
        let mut table = table();
        table.insert(String::new(), "everything".to_string());
        assert_eq!(find_retryable(&table, "unrelated"), None);
    }
}
