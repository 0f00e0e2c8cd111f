//! Sibling ordering for the file tree.
//!
//! Folders come before files. Names are compared the way a locale-aware
//! collator would present them to a user: case is folded for the primary
//! comparison, runs of digits compare by numeric value, and ties are broken
//! lowercase-first and finally by the raw bytes so that distinct names never
//! compare equal.

use super::node::EntryKind;
use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    /// Text starting with punctuation or whitespace
    Symbol(String),
    /// Digit run; `digits` is the length without leading zeros
    Number { digits: usize, value: String },
    /// Text starting with a letter
    Word(String),
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct NameKey {
    chunks: Vec<Chunk>,
    /// `true` for every uppercase letter, in order
    case: Vec<bool>,
    raw: String,
}

impl NameKey {
    fn new(name: &str) -> Self {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut in_digits = false;

        for c in name.chars() {
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != in_digits {
                chunks.push(Self::chunk(std::mem::take(&mut current), in_digits));
            }
            in_digits = is_digit;
            current.push(c);
        }
        if !current.is_empty() {
            chunks.push(Self::chunk(current, in_digits));
        }

        let case = name
            .chars()
            .filter(|c| c.is_alphabetic())
            .map(char::is_uppercase)
            .collect();

        Self {
            chunks,
            case,
            raw: name.to_string(),
        }
    }

    fn chunk(text: String, digits: bool) -> Chunk {
        if digits {
            let value = text.trim_start_matches('0').to_string();
            return Chunk::Number {
                digits: value.len(),
                value,
            };
        }
        let folded: String = text.chars().flat_map(char::to_lowercase).collect();
        match text.chars().next() {
            Some(c) if c.is_alphanumeric() => Chunk::Word(folded),
            _ => Chunk::Symbol(folded),
        }
    }
}

/// Compare two names in natural, case-folded order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    NameKey::new(a).cmp(&NameKey::new(b))
}

/// Sort key for `sort_by_cached_key`
pub(crate) fn sort_key(kind: EntryKind, name: &str) -> impl Ord {
    (kind, NameKey::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(names: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        v.sort_by(|a, b| natural_cmp(a, b));
        v
    }

    #[test]
    fn test_case_is_folded() {
        assert_eq!(sorted(&["b", "A", "a", "B"]), vec!["a", "A", "b", "B"]);
        assert_eq!(sorted(&["Zeta", "alpha"]), vec!["alpha", "Zeta"]);
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(
            sorted(&["file10.txt", "file2.txt", "file1.txt"]),
            vec!["file1.txt", "file2.txt", "file10.txt"]
        );
        assert_eq!(sorted(&["v010", "v9"]), vec!["v9", "v010"]);
    }

    #[test]
    fn test_distinct_names_never_equal() {
        assert_ne!(natural_cmp("a01", "a1"), Ordering::Equal);
        assert_ne!(natural_cmp("readme", "README"), Ordering::Equal);
        assert_eq!(natural_cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_punctuation_before_digits_before_letters() {
        assert_eq!(sorted(&["a", "1", ".env"]), vec![".env", "1", "a"]);
    }

    #[test]
    fn test_folders_first() {
        assert!(sort_key(EntryKind::File, "a") > sort_key(EntryKind::Folder, "z"));
        assert!(sort_key(EntryKind::Folder, "b") > sort_key(EntryKind::Folder, "a"));
    }
}
