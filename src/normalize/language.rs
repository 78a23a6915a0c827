//! Lightweight language identification.
//!
//! Non-Latin scripts are recognised by code-point range. Latin-script
//! text is matched against small stopword profiles; the profile with the
//! most hits wins, earlier profiles winning ties.

use std::collections::HashMap;

/// Share of letters a non-Latin script needs to decide the language
const SCRIPT_SHARE: f64 = 0.5;

const SCRIPTS: &[(u32, u32, &str)] = &[
    (0x0370, 0x03FF, "el"),
    (0x0400, 0x04FF, "ru"),
    (0x0590, 0x05FF, "he"),
    (0x0600, 0x06FF, "ar"),
    (0x0900, 0x097F, "hi"),
    (0x0980, 0x09FF, "bn"),
    (0x0A00, 0x0A7F, "pa"),
    (0x0A80, 0x0AFF, "gu"),
    (0x0B80, 0x0BFF, "ta"),
    (0x0C00, 0x0C7F, "te"),
    (0x3040, 0x30FF, "ja"),
    (0x4E00, 0x9FFF, "zh"),
    (0xAC00, 0xD7AF, "ko"),
];

pub(crate) const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "before", "being", "but", "by", "can", "could", "did", "do", "does",
    "doing", "don", "down", "each", "few", "for", "from", "had", "has", "have", "having", "he",
    "her", "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "just", "me", "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "you", "your", "yours",
];

const PROFILES: &[(&str, &[&str])] = &[
    ("en", ENGLISH_STOPWORDS),
    (
        "es",
        &["el", "la", "los", "las", "de", "que", "y", "en", "un", "una", "es", "por", "con",
          "para", "su", "pero", "muy", "tu", "yo", "sin", "vida"],
    ),
    (
        "fr",
        &["le", "la", "les", "de", "des", "et", "est", "un", "une", "que", "qui", "dans", "pour",
          "pas", "vous", "je", "tu", "ne", "avec", "sur", "ce"],
    ),
    (
        "de",
        &["der", "die", "das", "und", "ist", "nicht", "ein", "eine", "ich", "du", "zu", "mit",
          "sich", "auf", "den", "dem", "es", "auch", "wenn", "aber"],
    ),
    (
        "pt",
        &["o", "os", "as", "de", "que", "e", "do", "da", "em", "um", "uma", "para", "com",
          "nao", "não", "voce", "você", "mas", "se", "por"],
    ),
    (
        "it",
        &["il", "lo", "gli", "di", "che", "e", "un", "una", "per", "non", "sono", "con", "del",
          "della", "ma", "se", "ti", "io", "mi", "anche"],
    ),
];

pub(crate) fn is_english_stopword(word: &str) -> bool {
    ENGLISH_STOPWORDS.contains(&word)
}

/// ISO 639-1 code of the text's language, or None when undetermined
pub fn detect_language(text: &str) -> Option<&'static str> {
    if let Some(code) = detect_script(text) {
        return Some(code);
    }

    let words: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    if words.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for (code, stopwords) in PROFILES {
        let hits = words.iter().filter(|w| stopwords.contains(&w.as_str())).count();
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((code, hits));
        }
    }

    best.map(|(code, _)| code)
}

fn detect_script(text: &str) -> Option<&'static str> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let mut letters = 0usize;

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        let code = c as u32;
        if let Some((_, _, lang)) = SCRIPTS
            .iter()
            .find(|(lo, hi, _)| (*lo..=*hi).contains(&code))
        {
            *counts.entry(lang).or_default() += 1;
        }
    }

    if letters == 0 {
        return None;
    }

    counts
        .into_iter()
        .filter(|(_, n)| *n as f64 / letters as f64 >= SCRIPT_SHARE)
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(lang, _)| lang)
}
