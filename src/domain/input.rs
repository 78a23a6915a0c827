//! Raw input as received from an operator or a batch file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a piece of text came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Free-form origin label (e.g. "youtube", "book", "manual")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Origin URL, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Author or speaker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Text exactly as received.
///
/// The bytes are kept undecoded so the normalizer can apply its encoding
/// heuristics. Nothing exposes a mutable view of the contents.
#[derive(Debug, Clone)]
pub struct RawInput {
    id: Uuid,
    bytes: Vec<u8>,
    source: Option<SourceMetadata>,
    received_at: DateTime<Utc>,
}

impl RawInput {
    /// Wrap undecoded bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes: bytes.into(),
            source: None,
            received_at: Utc::now(),
        }
    }

    /// Wrap an already decoded string
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_bytes(text.into().into_bytes())
    }

    /// Attach source metadata
    pub fn with_source(mut self, source: SourceMetadata) -> Self {
        self.source = Some(source);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn source(&self) -> Option<&SourceMetadata> {
        self.source.as_ref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_keeps_bytes() {
        let raw = RawInput::from_text("Be still.");
        assert_eq!(raw.bytes(), b"Be still.");
        assert!(raw.source().is_none());
    }

    #[test]
    fn test_with_source() {
        let raw = RawInput::from_text("x").with_source(SourceMetadata {
            label: Some("youtube".to_string()),
            ..Default::default()
        });
        assert_eq!(raw.source().unwrap().label.as_deref(), Some("youtube"));
    }
}
