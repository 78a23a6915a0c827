//! Checks that cleaning kept the meaning-bearing words of a text.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::language::is_english_stopword;

/// Minimum share of content words that must survive cleaning
pub const PRESERVATION_THRESHOLD: f64 = 0.8;

const MAX_LISTED_WORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginalityReport {
    /// Share of the original content words still present
    pub preserved_ratio: f64,
    pub words_preserved: usize,
    pub words_lost: usize,
    pub words_added: usize,

    /// First few words present only in the cleaned text
    pub added_words: Vec<String>,

    /// Ratio met the threshold and nothing was added
    pub preserved: bool,
}

fn content_words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !is_english_stopword(w))
        .collect()
}

/// Compare the content words of `original` and `cleaned`
pub fn check_originality(original: &str, cleaned: &str) -> OriginalityReport {
    let before = content_words(original);
    let after = content_words(cleaned);

    let kept = before.intersection(&after).count();
    let added: Vec<String> = after.difference(&before).cloned().collect();
    let words_added = added.len();

    let preserved_ratio = if before.is_empty() {
        1.0
    } else {
        kept as f64 / before.len() as f64
    };

    OriginalityReport {
        preserved_ratio,
        words_preserved: kept,
        words_lost: before.len() - kept,
        words_added,
        added_words: added.into_iter().take(MAX_LISTED_WORDS).collect(),
        preserved: preserved_ratio >= PRESERVATION_THRESHOLD && words_added == 0,
    }
}
