//! Text normalizer.
//!
//! Turns `RawInput` bytes into `NormalizedText`:
//! decode -> repair mojibake -> shield protected terms -> strip noise ->
//! clean symbols -> normalise whitespace -> restore terms -> truncate.

mod cleanup;
mod encoding;
pub mod language;
pub mod originality;

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::core::error::ConfigurationError;
use crate::domain::{
    Change, LanguageTag, NormalizedText, RawInput, SourceEncoding, TermSpan, TextStats,
};

pub use language::detect_language;
pub use originality::{check_originality, OriginalityReport};

/// Normalizer failures. The caller must supply usable text; never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("Input bytes could not be decoded: {reason}")]
    Encoding { reason: String },

    #[error("Input is empty after normalization")]
    EmptyInput,
}

fn default_max_length() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_supported_languages() -> Vec<String> {
    vec!["en".to_string()]
}

/// Spiritual vocabulary kept verbatim by default
pub fn default_protected_terms() -> BTreeSet<String> {
    [
        "osho", "buddha", "sadhguru", "meditation", "karma", "dharma", "enlightenment",
        "consciousness", "awareness", "mindfulness", "spirituality", "moksha", "nirvana",
        "brahman", "atman", "yoga", "pranayama", "chakra", "kundalini", "mantra",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Normalizer options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    /// Keep single line breaks instead of joining lines
    #[serde(default)]
    pub preserve_formatting: bool,

    /// Maximum length in characters; 0 disables truncation
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Terms never altered by any pass (matched case-insensitively)
    #[serde(default = "default_protected_terms")]
    pub protected_terms: BTreeSet<String>,

    /// Language codes handled without a warning
    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<String>,

    /// Remove URLs, e-mail addresses, tags and bracketed asides
    #[serde(default = "default_true")]
    pub strip_noise: bool,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            preserve_formatting: false,
            max_length: default_max_length(),
            protected_terms: default_protected_terms(),
            supported_languages: default_supported_languages(),
            strip_noise: true,
        }
    }
}

pub struct Normalizer {
    options: NormalizerOptions,
    matcher: Option<Regex>,

    /// Lowercased term -> configured term
    terms: HashMap<String, String>,
}

impl Normalizer {
    pub fn new(options: NormalizerOptions) -> Result<Self, ConfigurationError> {
        let mut terms: Vec<&String> = options
            .protected_terms
            .iter()
            .filter(|t| !t.trim().is_empty())
            .collect();
        // Longest first so overlapping terms prefer the longer match
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let matcher = if terms.is_empty() {
            None
        } else {
            let alternation = terms
                .iter()
                .map(|t| regex::escape(t.trim()))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"(?i)\b(?:{})\b", alternation);
            Some(
                Regex::new(&pattern)
                    .map_err(|e| ConfigurationError::InvalidProtectedTerms(e.to_string()))?,
            )
        };

        let terms = terms
            .into_iter()
            .map(|t| (t.trim().to_lowercase(), t.trim().to_string()))
            .collect();

        Ok(Self {
            options,
            matcher,
            terms,
        })
    }

    pub fn options(&self) -> &NormalizerOptions {
        &self.options
    }

    /// Normalize raw input.
    ///
    /// Fails with `Encoding` when the bytes cannot be decoded and with
    /// `EmptyInput` when nothing is left after cleaning.
    pub fn normalize(&self, raw: &RawInput) -> Result<NormalizedText, NormalizeError> {
        let decoded = encoding::decode(raw.bytes())?;
        let original_text = decoded.text;
        let mut changes = Vec::new();

        if decoded.encoding != SourceEncoding::Utf8 {
            changes.push(Change::EncodingFixed);
        }

        let text = match encoding::repair_mojibake(&original_text) {
            Some(repaired) => {
                changes.push(Change::MojibakeRepaired);
                repaired
            }
            None => original_text.clone(),
        };

        let shielded = cleanup::shield(&text, self.matcher.as_ref(), |lower| {
            self.terms.get(lower).cloned()
        });
        let mut text = shielded.text;

        if self.options.strip_noise {
            let stripped = cleanup::remove_noise(&text);
            if stripped != text {
                changes.push(Change::NoiseRemoved);
                text = stripped;
            }
        }

        let cleaned = cleanup::clean_special_characters(&cleanup::fold_typography(&text));
        if cleaned != text {
            changes.push(Change::SpecialCharactersCleaned);
            text = cleaned;
        }

        let spaced = cleanup::normalize_whitespace(&text, self.options.preserve_formatting);
        if spaced != text {
            changes.push(Change::WhitespaceNormalized);
            text = spaced;
        }

        let (mut text, mut spans) = cleanup::restore(&text, &shielded.terms);

        if text.trim().is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        let truncated = self.truncate(&mut text, &mut spans);
        if truncated {
            changes.push(Change::Truncated);
        }
        if text.trim().is_empty() {
            return Err(NormalizeError::EmptyInput);
        }

        let language = self.language_tag(&text);
        let stats = text_stats(&original_text, &text);
        let content_hash = hex::encode(Sha256::digest(text.as_bytes()));

        debug!(
            raw_id = %raw.id(),
            encoding = ?decoded.encoding,
            language = %language.code,
            protected = spans.len(),
            truncated,
            "Normalized input"
        );

        Ok(NormalizedText::new(
            raw.id(),
            text,
            original_text,
            language,
            spans,
            decoded.encoding,
            decoded.replaced,
            truncated,
            changes,
            stats,
            content_hash,
        ))
    }

    /// Cut to `max_length` characters without splitting a protected span
    fn truncate(&self, text: &mut String, spans: &mut Vec<TermSpan>) -> bool {
        let max = self.options.max_length;
        if max == 0 {
            return false;
        }

        let Some((mut cut, _)) = text.char_indices().nth(max) else {
            return false;
        };

        if let Some(span) = spans.iter().find(|s| s.start < cut && cut < s.end) {
            // A leading protected term is kept whole rather than cut to nothing
            cut = if text[..span.start].trim().is_empty() {
                span.end
            } else {
                span.start
            };
        }

        text.truncate(cut);
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        spans.retain(|s| s.end <= text.len());
        true
    }

    fn language_tag(&self, text: &str) -> LanguageTag {
        let code = detect_language(text).unwrap_or(LanguageTag::UNDETERMINED);
        let supported = self
            .options
            .supported_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(code));
        LanguageTag {
            code: code.to_string(),
            supported,
        }
    }
}

fn text_stats(original: &str, cleaned: &str) -> TextStats {
    let original_chars = original.chars().count();
    let cleaned_chars = cleaned.chars().count();
    let reduction_percentage = if original_chars == 0 {
        0.0
    } else {
        let ratio = 1.0 - cleaned_chars as f64 / original_chars as f64;
        (ratio * 10_000.0).round() / 100.0
    };

    TextStats {
        original_chars,
        cleaned_chars,
        word_count: cleaned.split_whitespace().count(),
        reduction_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizerOptions::default()).unwrap()
    }

    #[test]
    fn test_protected_terms_survive_verbatim() {
        let raw = RawInput::from_text("Osho on KARMA!!! and Meditation... <b>now</b>");
        let text = normalizer().normalize(&raw).unwrap();

        assert!(text.as_str().contains("Osho"));
        assert!(text.as_str().contains("KARMA"));
        assert!(text.as_str().contains("Meditation"));
        for span in text.protected_spans() {
            let slice = &text.as_str()[span.start..span.end];
            assert_eq!(slice.to_lowercase(), span.term);
        }
    }

    #[test]
    fn test_empty_after_cleaning() {
        let raw = RawInput::from_text("   https://example.com  #tag ");
        assert_eq!(
            normalizer().normalize(&raw).unwrap_err(),
            NormalizeError::EmptyInput
        );
    }

    #[test]
    fn test_truncation_flag_and_span_boundary() {
        let options = NormalizerOptions {
            max_length: 12,
            ..Default::default()
        };
        let normalizer = Normalizer::new(options).unwrap();
        let text = normalizer
            .normalize(&RawInput::from_text("Practice meditation daily"))
            .unwrap();

        assert!(text.is_truncated());
        assert_eq!(text.as_str(), "Practice");
        assert!(text.protected_spans().is_empty());
        assert!(text.changes().contains(&Change::Truncated));
    }

    #[test]
    fn test_unsupported_language_is_flagged() {
        let text = normalizer()
            .normalize(&RawInput::from_text("La vida es muy corta para vivir con miedo"))
            .unwrap();
        assert_eq!(text.language().code, "es");
        assert!(!text.language().supported);
    }

    #[test]
    fn test_mojibake_and_hash() {
        let raw = RawInput::from_text("Don\u{E2}\u{20AC}\u{2122}t stop");
        let text = normalizer().normalize(&raw).unwrap();
        assert_eq!(text.as_str(), "Don't stop");
        assert!(text.changes().contains(&Change::MojibakeRepaired));
        assert_eq!(text.content_hash().len(), 64);
        assert_eq!(text.original_text(), "Don\u{E2}\u{20AC}\u{2122}t stop");
    }

    #[test]
    fn test_deterministic() {
        let a = normalizer().normalize(&RawInput::from_text("Same  text\nhere")).unwrap();
        let b = normalizer().normalize(&RawInput::from_text("Same  text\nhere")).unwrap();
        assert_eq!(a.as_str(), b.as_str());
        assert_eq!(a.content_hash(), b.content_hash());
    }
}
