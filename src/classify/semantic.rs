//! Embedding-similarity scorer against category prototypes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{Classifier, ScoringInput};
use crate::core::error::ConfigurationError;
use crate::domain::fingerprint::cosine_similarity;
use crate::domain::{CategoryVote, Fingerprint, SourceVotes, VoteSource};
use crate::taxonomy::Taxonomy;

pub struct SemanticClassifier {
    taxonomy: Arc<Taxonomy>,
    dimension: usize,
}

impl SemanticClassifier {
    /// Fails when any category lacks a prototype
    pub fn new(taxonomy: Arc<Taxonomy>) -> Result<Self, ConfigurationError> {
        let dimension = taxonomy.require_prototypes()?;
        Ok(Self {
            taxonomy,
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// One vote per category: cosine similarity clipped to [0, 1]
    pub fn score_fingerprint(&self, fingerprint: &Fingerprint) -> SourceVotes {
        if fingerprint.dimension() != self.dimension {
            return SourceVotes::degraded(format!(
                "fingerprint dimension {} does not match prototype dimension {}",
                fingerprint.dimension(),
                self.dimension
            ));
        }

        let votes = self
            .taxonomy
            .categories()
            .iter()
            .filter_map(|category| {
                let prototype = category.prototype.as_deref()?;
                let mut vote = CategoryVote::new(
                    category.id.clone(),
                    cosine_similarity(fingerprint.as_slice(), prototype),
                    VoteSource::Semantic,
                );
                for sub in &category.subcategories {
                    if let Some(sub_prototype) = sub.prototype.as_deref() {
                        vote = vote.with_subcategory(
                            sub.id.clone(),
                            cosine_similarity(fingerprint.as_slice(), sub_prototype),
                        );
                    }
                }
                Some(vote)
            })
            .collect();

        SourceVotes::available(votes)
    }
}

#[async_trait]
impl Classifier for SemanticClassifier {
    fn source(&self) -> VoteSource {
        VoteSource::Semantic
    }

    async fn score(&self, input: ScoringInput<'_>) -> SourceVotes {
        match input.fingerprint {
            Ok(fingerprint) => self.score_fingerprint(fingerprint),
            Err(e) => {
                warn!(source = "semantic", reason = %e, "Source degraded");
                SourceVotes::degraded(format!("no fingerprint: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::CategoryLabel;

    fn taxonomy() -> Arc<Taxonomy> {
        Arc::new(
            Taxonomy::new(
                vec![
                    CategoryLabel::new("a", "A")
                        .with_keywords(&["x"])
                        .with_prototype(vec![1.0, 0.0]),
                    CategoryLabel::new("b", "B")
                        .with_keywords(&["y"])
                        .with_prototype(vec![-1.0, 0.0]),
                ],
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_missing_prototype_is_configuration_error() {
        let taxonomy = Arc::new(
            Taxonomy::new(vec![CategoryLabel::new("a", "A").with_keywords(&["x"])], None).unwrap(),
        );
        assert!(matches!(
            SemanticClassifier::new(taxonomy),
            Err(ConfigurationError::MissingPrototype(_))
        ));
    }

    #[test]
    fn test_similarity_is_clipped() {
        let classifier = SemanticClassifier::new(taxonomy()).unwrap();
        let votes = classifier.score_fingerprint(&Fingerprint::new(vec![1.0, 0.0]).unwrap());
        let votes = votes.votes();
        assert_eq!(votes.len(), 2);
        assert!((votes[0].score - 1.0).abs() < 1e-9);
        // cosine -1 clips to 0
        assert_eq!(votes[1].score, 0.0);
    }

    #[test]
    fn test_dimension_mismatch_degrades() {
        let classifier = SemanticClassifier::new(taxonomy()).unwrap();
        let result = classifier.score_fingerprint(&Fingerprint::new(vec![1.0, 0.0, 0.0]).unwrap());
        assert!(!result.is_available());
    }
}
