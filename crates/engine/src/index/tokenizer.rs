//! Text tokenizer for search indexes
//!
//! Pipeline: whitespace split → trim non-alphanumeric edges → drop empty
//!           → lowercase → deduplicate → sort
//!
//! The same pipeline runs at index time and at query time. The sorted output
//! fixes the order in which posting lists are touched during maintenance.

use std::collections::BTreeSet;

/// Tokenize optional text into sorted, distinct, lower-case words
///
/// Absent or empty text yields no words.
pub fn tokenize(text: Option<&str>) -> Vec<String> {
    text.map(tokenize_str).unwrap_or_default()
}

/// Tokenize text into sorted, distinct, lower-case words
///
/// Punctuation is stripped from word edges only, so interior characters
/// survive.
///
/// # Example
///
/// ```
/// use keyspan_engine::index::tokenizer::tokenize_str;
///
/// assert_eq!(tokenize_str(" Blue, Jeans!! "), vec!["blue", "jeans"]);
/// assert_eq!(tokenize_str("co-op Co-op"), vec!["co-op"]);
/// ```
pub fn tokenize_str(text: &str) -> Vec<String> {
    let words: BTreeSet<String> = text
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    words.into_iter().collect()
}

/// Words in `from` that are not in `other`; both inputs sorted
pub(crate) fn sorted_difference(from: &[String], other: &[String]) -> Vec<String> {
    from.iter()
        .filter(|word| other.binary_search(word).is_err())
        .cloned()
        .collect()
}
