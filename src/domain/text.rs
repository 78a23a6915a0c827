//! Normalized text produced by the normalizer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the raw bytes were decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
    /// Clean UTF-8
    Utf8,

    /// Mostly UTF-8; invalid sequences replaced with U+FFFD
    Utf8Lossy,

    /// Decoded as Windows-1252 (no valid multi-byte sequences found)
    Windows1252,
}

/// A single transformation applied during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    EncodingFixed,
    MojibakeRepaired,
    WhitespaceNormalized,
    NoiseRemoved,
    SpecialCharactersCleaned,
    Truncated,
}

/// Detected language of a text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTag {
    /// ISO 639-1 code, or "und" when undetermined
    pub code: String,

    /// Whether the code is in the configured supported set
    pub supported: bool,
}

impl LanguageTag {
    pub const UNDETERMINED: &'static str = "und";
}

/// Where a protected term sits in the normalized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSpan {
    /// The configured protected term
    pub term: String,

    /// Byte offset range [start, end) in the normalized text
    pub start: usize,
    pub end: usize,
}

/// Size statistics recorded during normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub original_chars: usize,
    pub cleaned_chars: usize,
    pub word_count: usize,
    pub reduction_percentage: f64,
}

/// Cleaned text ready for classification.
///
/// Created once by the normalizer and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedText {
    raw_id: Uuid,
    text: String,
    original_text: String,
    language: LanguageTag,
    protected_spans: Vec<TermSpan>,
    encoding: SourceEncoding,
    replaced_bytes: usize,
    truncated: bool,
    changes: Vec<Change>,
    stats: TextStats,
    content_hash: String,
}

impl NormalizedText {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        raw_id: Uuid,
        text: String,
        original_text: String,
        language: LanguageTag,
        protected_spans: Vec<TermSpan>,
        encoding: SourceEncoding,
        replaced_bytes: usize,
        truncated: bool,
        changes: Vec<Change>,
        stats: TextStats,
        content_hash: String,
    ) -> Self {
        Self {
            raw_id,
            text,
            original_text,
            language,
            protected_spans,
            encoding,
            replaced_bytes,
            truncated,
            changes,
            stats,
            content_hash,
        }
    }

    /// Id of the RawInput this text was derived from
    pub fn raw_id(&self) -> Uuid {
        self.raw_id
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Decoded text before any cleaning
    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn language(&self) -> &LanguageTag {
        &self.language
    }

    pub fn protected_spans(&self) -> &[TermSpan] {
        &self.protected_spans
    }

    pub fn encoding(&self) -> SourceEncoding {
        self.encoding
    }

    /// Number of undecodable byte sequences replaced with U+FFFD
    pub fn replaced_bytes(&self) -> usize {
        self.replaced_bytes
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn stats(&self) -> &TextStats {
        &self.stats
    }

    /// SHA-256 of the normalized text, hex encoded
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// True when `range` overlaps any protected span
    pub fn overlaps_protected(&self, start: usize, end: usize) -> bool {
        self.protected_spans
            .iter()
            .any(|span| start < span.end && span.start < end)
    }
}
