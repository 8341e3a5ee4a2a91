use std::cmp::Ordering;
use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

use crate::key_filters::{is_key_allowed, key_prefix};

/// Body of the default key shape. The "no upper-case letter or digit on either
/// side" boundary is checked after matching.
pub const DEFAULT_ISSUE_PATTERN: &str = "[A-Z][A-Z0-9]{1,9}-[0-9]{1,6}";

#[derive(Debug, Error)]
#[error("invalid issue pattern {pattern:?}: {source}")]
pub struct KeyPatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
    enforce_boundaries: bool,
}

impl KeyPattern {
    pub fn default_pattern() -> Result<Self, KeyPatternError> {
        Ok(Self {
            regex: compile(DEFAULT_ISSUE_PATTERN)?,
            enforce_boundaries: true,
        })
    }

    /// A user pattern is used as-is: every whole match is a key.
    pub fn custom(pattern: &str) -> Result<Self, KeyPatternError> {
        Ok(Self {
            regex: compile(pattern)?,
            enforce_boundaries: false,
        })
    }

    /// Empty or whitespace-only input selects the default pattern.
    pub fn from_input(raw: &str) -> Result<Self, KeyPatternError> {
        if raw.trim().is_empty() {
            Self::default_pattern()
        } else {
            Self::custom(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.regex
            .find_iter(text)
            .filter(|found| !self.enforce_boundaries || has_key_boundaries(text, found.range()))
            .map(|found| found.as_str())
            .collect()
    }
}

fn compile(pattern: &str) -> Result<Regex, KeyPatternError> {
    Regex::new(pattern).map_err(|source| KeyPatternError {
        pattern: pattern.to_string(),
        source,
    })
}

fn is_key_char(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte.is_ascii_digit()
}

fn has_key_boundaries(text: &str, range: std::ops::Range<usize>) -> bool {
    let bytes = text.as_bytes();
    let before = range.start.checked_sub(1).and_then(|index| bytes.get(index));
    let after = bytes.get(range.end);
    !matches!(before, Some(byte) if is_key_char(*byte))
        && !matches!(after, Some(byte) if is_key_char(*byte))
}

/// Keys found in `text`, in match order, after blocklist and project filtering.
pub fn extract_keys(
    text: &str,
    projects: &[String],
    blocklist: &[String],
    pattern: &KeyPattern,
) -> Vec<String> {
    pattern
        .find_all(text)
        .into_iter()
        .filter(|key| is_key_allowed(key, projects, blocklist))
        .map(str::to_string)
        .collect()
}

pub fn extract_keys_from_texts<S: AsRef<str>>(
    texts: &[S],
    projects: &[String],
    blocklist: &[String],
    pattern: &KeyPattern,
) -> Vec<String> {
    let all = texts
        .iter()
        .flat_map(|text| extract_keys(text.as_ref(), projects, blocklist, pattern))
        .collect::<Vec<_>>();
    merge_and_sort(all)
}

fn numeric_suffix(key: &str) -> Option<u64> {
    let digits = key
        .split('-')
        .nth(1)?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().ok()
}

fn compare_keys(left: &str, right: &str) -> Ordering {
    key_prefix(left)
        .cmp(key_prefix(right))
        .then_with(|| match (numeric_suffix(left), numeric_suffix(right)) {
            (Some(left_number), Some(right_number)) => left_number.cmp(&right_number),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| left.cmp(right))
}

/// De-duplicates keys, then orders them by project prefix and numeric suffix.
pub fn merge_and_sort(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = keys
        .into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect::<Vec<_>>();
    unique.sort_by(|left, right| compare_keys(left, right));
    unique
}

#[cfg(test)]
mod tests {
    use super::{extract_keys, extract_keys_from_texts, merge_and_sort, KeyPattern};
    use crate::key_filters::{default_blocklist, DEFAULT_BLOCKLIST};

    fn pattern() -> KeyPattern {
        KeyPattern::default_pattern().expect("default pattern")
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn unit_extract_keys_finds_keys_in_branch_names() {
        assert_eq!(
            extract_keys("feature/PROJ-123-add-login", &[], &[], &pattern()),
            vec!["PROJ-123"]
        );
        assert_eq!(
            extract_keys("PROJ-1 and OPS-22 in one title", &[], &[], &pattern()),
            vec!["PROJ-1", "OPS-22"]
        );
    }

    #[test]
    fn unit_extract_keys_rejects_adjacent_key_characters() {
        assert!(extract_keys("XPROJ1-1234567", &[], &[], &pattern()).is_empty());
        assert!(extract_keys("PROJ-12A", &[], &[], &pattern()).is_empty());
        assert!(extract_keys("proj-12", &[], &[], &pattern()).is_empty());
        assert!(extract_keys("ABCDEFGHIJKL-1", &[], &[], &pattern()).is_empty());
        assert_eq!(
            extract_keys("(PROJ-9)", &[], &[], &pattern()),
            vec!["PROJ-9"]
        );
    }

    #[test]
    fn unit_extract_keys_filters_projects() {
        let projects = strings(&["PROJ"]);
        assert_eq!(
            extract_keys("PROJ-1 OPS-2", &projects, &[], &pattern()),
            vec!["PROJ-1"]
        );
    }

    #[test]
    fn unit_default_blocklist_filters_every_entry() {
        let text = DEFAULT_BLOCKLIST
            .iter()
            .map(|prefix| format!("{prefix}-1"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(extract_keys(&text, &[], &default_blocklist(), &pattern()).is_empty());
    }

    #[test]
    fn regression_false_positives_pass_without_blocklist() {
        let keys = extract_keys("uses SHA-256 and UTF-8 encoding", &[], &[], &pattern());
        assert!(keys.contains(&"SHA-256".to_string()));
        assert!(keys.contains(&"UTF-8".to_string()));
    }

    #[test]
    fn unit_custom_pattern_uses_whole_matches() {
        let custom = KeyPattern::custom("CUSTOM-[0-9]+").expect("custom pattern");
        assert_eq!(extract_keys("CUSTOM-99 PROJ-1", &[], &[], &custom), vec!["CUSTOM-99"]);
    }

    #[test]
    fn unit_invalid_custom_pattern_is_an_error() {
        let error = KeyPattern::from_input("PROJ-(").expect_err("invalid pattern");
        assert!(error.to_string().contains("PROJ-("));
        assert!(KeyPattern::from_input("  ").is_ok());
    }

    #[test]
    fn unit_merge_and_sort_dedupes_and_orders_numerically() {
        assert_eq!(
            merge_and_sort(strings(&["PROJ-10", "ABC-2", "PROJ-9", "PROJ-10", "ABC-1"])),
            strings(&["ABC-1", "ABC-2", "PROJ-9", "PROJ-10"])
        );
        assert!(merge_and_sort(Vec::new()).is_empty());
    }

    #[test]
    fn functional_extract_keys_from_texts_merges_all_sources() {
        let texts = ["feature/PROJ-2", "PROJ-1: fix", "commit for OPS-5\n\nRefs PROJ-2"];
        assert_eq!(
            extract_keys_from_texts(&texts, &[], &[], &pattern()),
            strings(&["OPS-5", "PROJ-1", "PROJ-2"])
        );
    }
}
