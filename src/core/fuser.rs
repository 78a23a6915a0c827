//! Ensemble fuser.
//!
//! Combines per-source votes into one `ClassificationResult`:
//! 1. Effective weights: configured weights renormalised over the
//!    available sources; degraded sources get zero.
//! 2. Per category: sum over sources of effective weight times that
//!    source's best score for the category.
//! 3. Primary category: highest sum. Ties go to the category the
//!    zero-shot, then semantic, then keyword source scored higher, then
//!    to the smallest id.
//! 4. Subcategories: the best per-source subcategory score when any
//!    source has one, else the aggregate split evenly; kept above the
//!    subcategory threshold.
//!
//! `fuse` is a pure function of its input and configuration.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::ConfigurationError;
use crate::domain::vote::clip_unit;
use crate::domain::{
    CategoryId, CategoryScore, CategoryVote, ClassificationResult, ScoredSubcategory, SourceBreakdown,
    SourceStatus, SourceVotes, SubcategoryId, VoteSource,
};
use crate::taxonomy::{CategoryLabel, Taxonomy};

/// Scores closer than this are treated as equal
const TIE_EPSILON: f64 = 1e-9;

fn default_keyword_weight() -> f64 {
    0.25
}
fn default_semantic_weight() -> f64 {
    0.35
}
fn default_zero_shot_weight() -> f64 {
    0.40
}
fn default_subcategory_threshold() -> f64 {
    0.3
}
fn default_min_confidence() -> f64 {
    0.3
}
fn default_fallback_category() -> Option<CategoryId> {
    Some(CategoryId::new("general_curiosity"))
}

/// Relative trust in each source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceWeights {
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic: f64,
    #[serde(default = "default_zero_shot_weight")]
    pub zero_shot: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            keyword: default_keyword_weight(),
            semantic: default_semantic_weight(),
            zero_shot: default_zero_shot_weight(),
        }
    }
}

impl SourceWeights {
    pub fn get(&self, source: VoteSource) -> f64 {
        match source {
            VoteSource::Keyword => self.keyword,
            VoteSource::Semantic => self.semantic,
            VoteSource::ZeroShot => self.zero_shot,
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for source in VoteSource::ALL {
            let w = self.get(source);
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigurationError::InvalidWeights(format!(
                    "{} weight must be a non-negative number, got {}",
                    source, w
                )));
            }
        }
        if VoteSource::ALL.iter().map(|s| self.get(*s)).sum::<f64>() <= 0.0 {
            return Err(ConfigurationError::InvalidWeights(
                "at least one weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fusion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub weights: SourceWeights,

    /// Subcategories must score strictly above this
    #[serde(default = "default_subcategory_threshold")]
    pub subcategory_threshold: f64,

    /// Results below this are marked low confidence
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Reported when no category has any support
    #[serde(default = "default_fallback_category")]
    pub fallback_category: Option<CategoryId>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: SourceWeights::default(),
            subcategory_threshold: default_subcategory_threshold(),
            min_confidence: default_min_confidence(),
            fallback_category: default_fallback_category(),
        }
    }
}

/// Votes keyed by source. A missing source counts as degraded.
pub type VotesBySource = BTreeMap<VoteSource, SourceVotes>;

pub struct Fuser {
    taxonomy: Arc<Taxonomy>,
    config: FusionConfig,
    fallback: CategoryLabel,
}

impl Fuser {
    pub fn new(taxonomy: Arc<Taxonomy>, config: FusionConfig) -> Result<Self, ConfigurationError> {
        config.weights.validate()?;

        for (name, value) in [
            ("subcategory threshold", config.subcategory_threshold),
            ("minimum confidence", config.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::InvalidThreshold { name, value });
            }
        }

        let fallback = match &config.fallback_category {
            Some(id) => taxonomy
                .get(id)
                .cloned()
                .ok_or_else(|| ConfigurationError::UnknownFallbackCategory(id.to_string()))?,
            None => taxonomy
                .categories()
                .first()
                .cloned()
                .ok_or(ConfigurationError::CategoryCount {
                    expected: 1,
                    actual: 0,
                })?,
        };

        Ok(Self {
            taxonomy,
            config,
            fallback,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Weights after redistribution away from degraded sources.
    ///
    /// Sums to 1.0 whenever a source with positive weight is available;
    /// all zero otherwise.
    pub fn effective_weights(&self, votes: &VotesBySource) -> BTreeMap<VoteSource, f64> {
        let available = |s: &VoteSource| votes.get(s).is_some_and(SourceVotes::is_available);

        let total: f64 = VoteSource::ALL
            .iter()
            .filter(|s| available(*s))
            .map(|s| self.config.weights.get(*s))
            .sum();

        VoteSource::ALL
            .iter()
            .map(|s| {
                let weight = if total > 0.0 && available(s) {
                    self.config.weights.get(*s) / total
                } else {
                    0.0
                };
                (*s, weight)
            })
            .collect()
    }

    /// Best score each available source gave each category
    fn per_source_scores(&self, votes: &VotesBySource) -> HashMap<VoteSource, HashMap<CategoryId, f64>> {
        let mut table: HashMap<VoteSource, HashMap<CategoryId, f64>> = HashMap::new();

        for (source, source_votes) in votes {
            let entry = table.entry(*source).or_default();
            for vote in source_votes.votes() {
                if !self.taxonomy.contains(&vote.category) {
                    debug!(source = %source, category = %vote.category, "Dropping vote for unknown category");
                    continue;
                }
                let best = entry.entry(vote.category.clone()).or_insert(0.0);
                *best = best.max(clip_unit(vote.score));
            }
        }

        table
    }

    /// Fuse votes into a single result. Deterministic.
    pub fn fuse(&self, votes: &VotesBySource) -> ClassificationResult {
        let weights = self.effective_weights(votes);
        let table = self.per_source_scores(votes);

        let score_of = |source: VoteSource, category: &CategoryId| -> f64 {
            table
                .get(&source)
                .and_then(|m| m.get(category))
                .copied()
                .unwrap_or(0.0)
        };

        let sums: Vec<(&CategoryLabel, f64)> = self
            .taxonomy
            .categories()
            .iter()
            .map(|category| {
                let sum = VoteSource::ALL
                    .iter()
                    .map(|s| weights[s] * score_of(*s, &category.id))
                    .sum::<f64>();
                (category, clip_unit(sum))
            })
            .collect();

        let compare = |a: &(&CategoryLabel, f64), b: &(&CategoryLabel, f64)| -> Ordering {
            if (a.1 - b.1).abs() > TIE_EPSILON {
                return a.1.total_cmp(&b.1);
            }
            for source in VoteSource::by_priority() {
                let (x, y) = (score_of(source, &a.0.id), score_of(source, &b.0.id));
                if (x - y).abs() > TIE_EPSILON {
                    return x.total_cmp(&y);
                }
            }
            // Smaller id wins, so it compares as greater
            b.0.id.cmp(&a.0.id)
        };

        let best = sums
            .iter()
            .filter(|(_, sum)| *sum > 0.0)
            .max_by(|a, b| compare(*a, *b));

        let (category, confidence, fallback) = match best {
            Some((label, sum)) => ((*label).clone(), *sum, false),
            None => (self.fallback.clone(), 0.0, true),
        };

        let subcategories = if fallback {
            Vec::new()
        } else {
            self.select_subcategories(&category, confidence, votes)
        };

        let mut category_scores: Vec<CategoryScore> = sums
            .iter()
            .map(|(label, sum)| CategoryScore {
                category: label.id.clone(),
                score: *sum,
            })
            .collect();
        category_scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.category.cmp(&b.category))
        });

        let breakdown = VoteSource::ALL
            .iter()
            .map(|source| {
                let (status, source_votes) = match votes.get(source) {
                    Some(SourceVotes::Available { votes: list }) => {
                        (SourceStatus::Available, self.known_votes(list))
                    }
                    Some(SourceVotes::Degraded { reason }) => (
                        SourceStatus::Degraded {
                            reason: reason.clone(),
                        },
                        Vec::new(),
                    ),
                    None => (
                        SourceStatus::Degraded {
                            reason: "no votes supplied".to_string(),
                        },
                        Vec::new(),
                    ),
                };
                SourceBreakdown {
                    source: *source,
                    status,
                    weight: self.config.weights.get(*source),
                    effective_weight: weights[source],
                    votes: source_votes,
                }
            })
            .collect();

        let low_confidence = fallback || confidence < self.config.min_confidence;

        debug!(
            category = %category.id,
            confidence,
            low_confidence,
            fallback,
            "Fused classification"
        );

        ClassificationResult {
            category: category.id,
            subcategories,
            confidence,
            low_confidence,
            fallback,
            category_scores,
            breakdown,
            duplicate_of: None,
        }
    }

    /// Votes restricted to ids that exist in the taxonomy
    fn known_votes(&self, votes: &[CategoryVote]) -> Vec<CategoryVote> {
        votes
            .iter()
            .filter_map(|vote| {
                let label = self.taxonomy.get(&vote.category)?;
                let mut vote = vote.clone();
                vote.subcategories
                    .retain(|sub| label.subcategory(&sub.subcategory).is_some());
                Some(vote)
            })
            .collect()
    }

    fn select_subcategories(
        &self,
        category: &CategoryLabel,
        confidence: f64,
        votes: &VotesBySource,
    ) -> Vec<ScoredSubcategory> {
        let mut best: HashMap<&SubcategoryId, f64> = HashMap::new();

        for source_votes in votes.values() {
            for vote in source_votes.votes().iter().filter(|v| v.category == category.id) {
                for sub in &vote.subcategories {
                    let Some(label) = category.subcategory(&sub.subcategory) else {
                        continue;
                    };
                    let entry = best.entry(&label.id).or_insert(0.0);
                    *entry = entry.max(clip_unit(sub.score));
                }
            }
        }

        let mut scored: Vec<ScoredSubcategory> = if best.is_empty() {
            let n = category.subcategories.len().max(1) as f64;
            category
                .subcategories
                .iter()
                .map(|s| ScoredSubcategory {
                    id: s.id.clone(),
                    confidence: confidence / n,
                })
                .collect()
        } else {
            best.into_iter()
                .map(|(id, confidence)| ScoredSubcategory {
                    id: id.clone(),
                    confidence,
                })
                .collect()
        };

        scored.retain(|s| s.confidence > self.config.subcategory_threshold);
        scored.sort_by(|a, b| {
            b.confidence.total_cmp(&a.confidence).then_with(|| {
                category
                    .subcategory_position(&a.id)
                    .cmp(&category.subcategory_position(&b.id))
            })
        });
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Arc<Taxonomy> {
        Arc::new(
            Taxonomy::new(
                vec![
                    CategoryLabel::new("career", "Career")
                        .with_keywords(&["job"])
                        .with_subcategory("exam", "Exam")
                        .with_subcategory("job_search", "Job Search"),
                    CategoryLabel::new("general_curiosity", "General").with_keywords(&["learn"]),
                    CategoryLabel::new("relationships", "Relationships")
                        .with_keywords(&["love"])
                        .with_subcategory("breakups", "Breakups"),
                ],
                None,
            )
            .unwrap(),
        )
    }

    fn fuser() -> Fuser {
        Fuser::new(taxonomy(), FusionConfig::default()).unwrap()
    }

    fn vote(category: &str, score: f64, source: VoteSource) -> CategoryVote {
        CategoryVote::new(category.into(), score, source)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = FusionConfig::default();
        config.weights.keyword = -1.0;
        assert!(matches!(
            Fuser::new(taxonomy(), config),
            Err(ConfigurationError::InvalidWeights(_))
        ));

        let config = FusionConfig {
            fallback_category: Some("nowhere".into()),
            ..Default::default()
        };
        assert!(matches!(
            Fuser::new(taxonomy(), config),
            Err(ConfigurationError::UnknownFallbackCategory(_))
        ));

        let config = FusionConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(Fuser::new(taxonomy(), config).is_err());
    }

    #[test]
    fn test_even_split_subcategories() {
        let mut votes = VotesBySource::new();
        votes.insert(
            VoteSource::Keyword,
            SourceVotes::available(vec![vote("career", 1.0, VoteSource::Keyword)]),
        );
        votes.insert(
            VoteSource::Semantic,
            SourceVotes::available(vec![vote("career", 1.0, VoteSource::Semantic)]),
        );
        votes.insert(
            VoteSource::ZeroShot,
            SourceVotes::available(vec![vote("career", 1.0, VoteSource::ZeroShot)]),
        );

        let result = fuser().fuse(&votes);
        assert_eq!(result.category.as_str(), "career");
        assert!((result.confidence - 1.0).abs() < 1e-9);
        // 1.0 split over two subcategories = 0.5 each, both above 0.3
        assert_eq!(result.subcategories.len(), 2);
        assert_eq!(result.subcategories[0].id.as_str(), "exam");
        assert!((result.subcategories[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_max_subcategory_vote_wins() {
        let mut votes = VotesBySource::new();
        votes.insert(
            VoteSource::Keyword,
            SourceVotes::available(vec![vote("career", 0.9, VoteSource::Keyword)
                .with_subcategory("job_search".into(), 0.2)]),
        );
        votes.insert(
            VoteSource::ZeroShot,
            SourceVotes::available(vec![vote("career", 0.8, VoteSource::ZeroShot)
                .with_subcategory("job_search".into(), 0.6)
                .with_subcategory("exam".into(), 0.1)]),
        );
        votes.insert(VoteSource::Semantic, SourceVotes::degraded("timeout"));

        let result = fuser().fuse(&votes);
        assert_eq!(result.subcategories.len(), 1);
        assert_eq!(result.subcategories[0].id.as_str(), "job_search");
        assert!((result.subcategories[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_category_votes_ignored() {
        let mut votes = VotesBySource::new();
        votes.insert(
            VoteSource::Keyword,
            SourceVotes::available(vec![vote("astrology", 1.0, VoteSource::Keyword)]),
        );
        let result = fuser().fuse(&votes);
        assert!(result.fallback);
        assert_eq!(result.category.as_str(), "general_curiosity");
    }

    #[test]
    fn test_breakdown_keeps_only_known_ids() {
        let mut votes = VotesBySource::new();
        votes.insert(
            VoteSource::ZeroShot,
            SourceVotes::available(vec![
                vote("astrology", 0.9, VoteSource::ZeroShot),
                vote("career", 0.7, VoteSource::ZeroShot)
                    .with_subcategory("exam".into(), 0.5)
                    .with_subcategory("breakups".into(), 0.4),
            ]),
        );

        let result = fuser().fuse(&votes);
        let zero_shot = result
            .breakdown
            .iter()
            .find(|b| b.source == VoteSource::ZeroShot)
            .unwrap();
        assert_eq!(zero_shot.votes.len(), 1);
        assert_eq!(zero_shot.votes[0].category.as_str(), "career");
        let subs: Vec<&str> = zero_shot.votes[0]
            .subcategories
            .iter()
            .map(|s| s.subcategory.as_str())
            .collect();
        assert_eq!(subs, ["exam"]);
    }

    #[test]
    fn test_breakdown_lists_every_source() {
        let result = fuser().fuse(&VotesBySource::new());
        assert_eq!(result.breakdown.len(), 3);
        assert!(result.breakdown.iter().all(|b| !b.status.is_available()));
        assert_eq!(result.degraded_sources().count(), 3);
    }
}
