//! Review gate.
//!
//! The only place a `ConfirmedRecord` is created. A reviewer sees the
//! fused result with its vote breakdown and warnings, then accepts,
//! edits or rejects it. Rejection produces nothing to persist.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domain::vote::clip_unit;
use crate::domain::{
    AdviceRecord, CategoryId, ClassificationResult, ConfirmedRecord, Fingerprint, NormalizedText,
    ReviewMode, ReviewProvenance, ReviewWarning, ScoredSubcategory, SourceMetadata, SubcategoryId,
};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReviewError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Subcategory '{subcategory}' does not belong to category '{category}'")]
    SubcategoryNotInCategory { category: String, subcategory: String },

    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("Reviewer failed: {0}")]
    Reviewer(String),
}

/// Everything the operator is shown for one input
#[derive(Debug, Clone, Serialize)]
pub struct ReviewCandidate {
    pub text: NormalizedText,
    pub result: ClassificationResult,
    pub warnings: Vec<ReviewWarning>,

    #[serde(skip)]
    pub fingerprint: Option<Fingerprint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceMetadata>,
}

/// Operator edits; unset fields keep the fused value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategories: Option<Vec<SubcategoryId>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ReviewOverride {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.subcategories.is_none() && self.confidence.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    Accept,
    Override(ReviewOverride),
    Reject { reason: Option<String> },
}

#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Confirmed(ConfirmedRecord),
    Rejected {
        raw_id: Uuid,
        reason: Option<String>,
    },
}

impl ReviewOutcome {
    pub fn confirmed(&self) -> Option<&ConfirmedRecord> {
        match self {
            ReviewOutcome::Confirmed(record) => Some(record),
            ReviewOutcome::Rejected { .. } => None,
        }
    }
}

/// Decides what happens to a candidate
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Implicit for unattended reviewers, explicit for operators
    fn mode(&self) -> ReviewMode;

    /// Recorded in the provenance, when known
    fn name(&self) -> Option<String> {
        None
    }

    async fn review(&self, candidate: &ReviewCandidate) -> Result<ReviewDecision, ReviewError>;
}

/// Accepts every candidate unchanged (batch mode, `--yes`)
pub struct AutoApprove;

#[async_trait]
impl Reviewer for AutoApprove {
    fn mode(&self) -> ReviewMode {
        ReviewMode::Implicit
    }

    async fn review(&self, _candidate: &ReviewCandidate) -> Result<ReviewDecision, ReviewError> {
        Ok(ReviewDecision::Accept)
    }
}

pub struct ReviewGate {
    taxonomy: Arc<Taxonomy>,
}

impl ReviewGate {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    /// Show a candidate to the reviewer and apply the decision
    pub async fn present(
        &self,
        candidate: ReviewCandidate,
        reviewer: &dyn Reviewer,
    ) -> Result<ReviewOutcome, ReviewError> {
        let decision = reviewer.review(&candidate).await?;
        self.decide(candidate, decision, reviewer.mode(), reviewer.name())
    }

    /// Apply a decision. Invalid overrides are errors; nothing is confirmed.
    pub fn decide(
        &self,
        candidate: ReviewCandidate,
        decision: ReviewDecision,
        mode: ReviewMode,
        reviewer: Option<String>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let edit = match decision {
            ReviewDecision::Reject { reason } => {
                info!(raw_id = %candidate.text.raw_id(), reason = ?reason, "Candidate rejected");
                return Ok(ReviewOutcome::Rejected {
                    raw_id: candidate.text.raw_id(),
                    reason,
                });
            }
            ReviewDecision::Accept => ReviewOverride::default(),
            ReviewDecision::Override(edit) => edit,
        };

        let (category, subcategories, confidence) = self.apply(&candidate.result, &edit)?;
        let edited = category != candidate.result.category
            || subcategories != candidate.result.subcategories
            || confidence != candidate.result.confidence;

        let record = AdviceRecord {
            id: Uuid::new_v4(),
            category,
            subcategories,
            confidence,
            text: candidate.text.as_str().to_string(),
            original_text: candidate.text.original_text().to_string(),
            language: candidate.text.language().code.clone(),
            content_hash: candidate.text.content_hash().to_string(),
            source: candidate.source,
            review: ReviewProvenance {
                mode,
                edited,
                reviewer,
                confirmed_at: Utc::now(),
            },
            breakdown: candidate.result.breakdown,
            duplicate_of: candidate.result.duplicate_of,
            warnings: candidate.warnings,
            fingerprint: candidate.fingerprint,
        };

        info!(
            record_id = %record.id,
            category = %record.category,
            confidence = record.confidence,
            edited,
            "Candidate confirmed"
        );

        Ok(ReviewOutcome::Confirmed(ConfirmedRecord::new(record)))
    }

    fn apply(
        &self,
        result: &ClassificationResult,
        edit: &ReviewOverride,
    ) -> Result<(CategoryId, Vec<ScoredSubcategory>, f64), ReviewError> {
        let category = edit.category.clone().unwrap_or_else(|| result.category.clone());
        let label = self
            .taxonomy
            .get(&category)
            .ok_or_else(|| ReviewError::UnknownCategory(category.to_string()))?;

        let confidence = match edit.confidence {
            Some(c) if !(0.0..=1.0).contains(&c) => return Err(ReviewError::ConfidenceOutOfRange(c)),
            Some(c) => c,
            None => result.confidence,
        };

        let subcategories = match &edit.subcategories {
            Some(ids) => {
                let mut chosen = Vec::with_capacity(ids.len());
                for id in ids {
                    if label.subcategory(id).is_none() {
                        return Err(ReviewError::SubcategoryNotInCategory {
                            category: category.to_string(),
                            subcategory: id.to_string(),
                        });
                    }
                    if chosen.iter().any(|s: &ScoredSubcategory| &s.id == id) {
                        continue;
                    }
                    let prior = result
                        .subcategories
                        .iter()
                        .find(|s| &s.id == id && category == result.category)
                        .map(|s| s.confidence);
                    chosen.push(ScoredSubcategory {
                        id: id.clone(),
                        confidence: clip_unit(prior.unwrap_or(confidence)),
                    });
                }
                chosen
            }
            // A new category invalidates the fused subcategories
            None if category != result.category => Vec::new(),
            None => result.subcategories.clone(),
        };

        Ok((category, subcategories, confidence))
    }
}
