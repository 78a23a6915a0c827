//! Fused classification results and operator-facing warnings.

use serde::{Deserialize, Serialize};

use super::fingerprint::DuplicateMatch;
use super::vote::{CategoryId, CategoryVote, SubcategoryId, VoteSource};

/// Whether a source contributed to the fusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Available,
    Degraded { reason: String },
}

impl SourceStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, SourceStatus::Available)
    }
}

/// Per-source audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBreakdown {
    pub source: VoteSource,
    pub status: SourceStatus,

    /// Configured weight
    pub weight: f64,

    /// Weight after redistribution away from degraded sources
    pub effective_weight: f64,

    pub votes: Vec<CategoryVote>,
}

/// Weighted sum for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: CategoryId,
    pub score: f64,
}

/// Selected subcategory with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSubcategory {
    pub id: SubcategoryId,
    pub confidence: f64,
}

/// Output of the ensemble fuser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Primary category
    pub category: CategoryId,

    /// Subcategories above threshold, highest confidence first
    pub subcategories: Vec<ScoredSubcategory>,

    /// Weighted sum of the primary category, in [0, 1]
    pub confidence: f64,

    /// Confidence fell below the configured minimum
    pub low_confidence: bool,

    /// No category had any support; the fallback category was used
    pub fallback: bool,

    /// Every category's weighted sum, highest first
    pub category_scores: Vec<CategoryScore>,

    /// What each source said and how much it counted
    pub breakdown: Vec<SourceBreakdown>,

    /// Near-duplicate of a stored record, if any
    pub duplicate_of: Option<DuplicateMatch>,
}

impl ClassificationResult {
    /// Sources that were degraded for this result
    pub fn degraded_sources(&self) -> impl Iterator<Item = (&VoteSource, &str)> {
        self.breakdown.iter().filter_map(|b| match &b.status {
            SourceStatus::Degraded { reason } => Some((&b.source, reason.as_str())),
            SourceStatus::Available => None,
        })
    }

    pub fn subcategory_ids(&self) -> Vec<SubcategoryId> {
        self.subcategories.iter().map(|s| s.id.clone()).collect()
    }
}

/// Annotation shown to the operator alongside a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewWarning {
    LowConfidence { confidence: f64, minimum: f64 },
    DegradedSource { source: VoteSource, reason: String },
    DuplicateUnchecked { reason: String },
    Duplicate { of: DuplicateMatch },
    UnsupportedLanguage { language: String },
    Truncated { max_length: usize },
    ReplacedBytes { count: usize },
    OriginalityLoss { preserved_ratio: f64, added_words: usize },
}

impl std::fmt::Display for ReviewWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewWarning::LowConfidence { confidence, minimum } => {
                write!(f, "low confidence: {:.3} < {:.3}", confidence, minimum)
            }
            ReviewWarning::DegradedSource { source, reason } => {
                write!(f, "source '{}' degraded: {}", source, reason)
            }
            ReviewWarning::DuplicateUnchecked { reason } => {
                write!(f, "duplicate check skipped: {}", reason)
            }
            ReviewWarning::Duplicate { of } => write!(
                f,
                "near-duplicate of record {} (similarity {:.3})",
                of.record_id, of.similarity
            ),
            ReviewWarning::UnsupportedLanguage { language } => {
                write!(f, "unsupported language '{}', needs manual handling", language)
            }
            ReviewWarning::Truncated { max_length } => {
                write!(f, "text truncated to {} characters", max_length)
            }
            ReviewWarning::ReplacedBytes { count } => {
                write!(f, "{} undecodable byte sequence(s) replaced", count)
            }
            ReviewWarning::OriginalityLoss {
                preserved_ratio,
                added_words,
            } => write!(
                f,
                "cleaning preserved {:.0}% of content words ({} added)",
                preserved_ratio * 100.0,
                added_words
            ),
        }
    }
}
