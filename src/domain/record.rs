//! Confirmed records, the only values a record store accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fingerprint::{DuplicateMatch, Fingerprint};
use super::input::SourceMetadata;
use super::result::{ReviewWarning, ScoredSubcategory, SourceBreakdown};
use super::vote::CategoryId;

/// How the record was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// Confirmed without operator interaction (batch auto-approve)
    Implicit,

    /// Confirmed by an operator
    Explicit,
}

/// Audit data about the review decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewProvenance {
    pub mode: ReviewMode,

    /// Operator changed category, subcategories or confidence
    pub edited: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,

    pub confirmed_at: DateTime<Utc>,
}

/// A persisted advice entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRecord {
    pub id: Uuid,
    pub category: CategoryId,
    pub subcategories: Vec<ScoredSubcategory>,
    pub confidence: f64,

    /// Normalized text
    pub text: String,
    pub original_text: String,
    pub language: String,
    pub content_hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceMetadata>,

    pub review: ReviewProvenance,

    /// Vote breakdown at classification time
    #[serde(default)]
    pub breakdown: Vec<SourceBreakdown>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<DuplicateMatch>,

    #[serde(default)]
    pub warnings: Vec<ReviewWarning>,

    /// Kept so the duplicate index can be rebuilt from storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// A record that passed the review gate.
///
/// Only the review gate can construct one, so holding a `ConfirmedRecord`
/// proves confirmation happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfirmedRecord {
    record: AdviceRecord,
}

impl ConfirmedRecord {
    pub(crate) fn new(record: AdviceRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &AdviceRecord {
        &self.record
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.record.fingerprint.as_ref()
    }

    pub fn into_record(self) -> AdviceRecord {
        self.record
    }
}
