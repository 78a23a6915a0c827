//! Zero-shot classifier adapter.
//!
//! Builds the candidate labels from the taxonomy, calls the external
//! scorer under a timeout, and turns its label scores into votes. Any
//! scorer failure becomes a degraded source, never an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Classifier, ScoringInput};
use crate::adapters::{call_with_timeout, ZeroShotScorer};
use crate::domain::{CategoryId, CategoryVote, SourceVotes, SubcategoryId, VoteSource};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone)]
enum LabelTarget {
    Category(CategoryId),
    Subcategory(CategoryId, SubcategoryId),
}

pub struct ZeroShotClassifier {
    taxonomy: Arc<Taxonomy>,
    scorer: Arc<dyn ZeroShotScorer>,
    timeout: Duration,
    labels: Vec<String>,
    targets: HashMap<String, LabelTarget>,
}

impl ZeroShotClassifier {
    pub fn new(taxonomy: Arc<Taxonomy>, scorer: Arc<dyn ZeroShotScorer>, timeout: Duration) -> Self {
        let mut classifier = Self {
            taxonomy,
            scorer,
            timeout,
            labels: Vec::new(),
            targets: HashMap::new(),
        };
        classifier.build_labels(false);
        classifier
    }

    /// Also score every subcategory as its own label
    pub fn with_subcategory_labels(mut self) -> Self {
        self.build_labels(true);
        self
    }

    fn build_labels(&mut self, subcategories: bool) {
        self.labels.clear();
        self.targets.clear();

        for category in self.taxonomy.categories() {
            self.labels.push(category.name.clone());
            self.targets
                .insert(category.name.clone(), LabelTarget::Category(category.id.clone()));

            if subcategories {
                for sub in &category.subcategories {
                    let label = format!("{} in the context of {}", sub.name, category.name);
                    self.labels.push(label.clone());
                    self.targets.insert(
                        label,
                        LabelTarget::Subcategory(category.id.clone(), sub.id.clone()),
                    );
                }
            }
        }
    }

    /// Labels sent to the scorer, in taxonomy order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Convert raw label scores into votes, in taxonomy order.
    ///
    /// Labels the taxonomy does not know are ignored.
    pub fn votes_from_scores(&self, scores: &HashMap<String, f64>) -> Vec<CategoryVote> {
        let mut category_scores: HashMap<&CategoryId, f64> = HashMap::new();
        let mut sub_scores: HashMap<&CategoryId, Vec<(SubcategoryId, f64)>> = HashMap::new();

        for (label, score) in scores {
            match self.targets.get(label) {
                Some(LabelTarget::Category(category)) => {
                    category_scores.insert(category, *score);
                }
                Some(LabelTarget::Subcategory(category, sub)) => {
                    sub_scores
                        .entry(category)
                        .or_default()
                        .push((sub.clone(), *score));
                }
                None => debug!(label = %label, "Ignoring unknown zero-shot label"),
            }
        }

        let mut votes = Vec::new();
        for category in self.taxonomy.categories() {
            let score = category_scores.get(&category.id).copied();
            let subs = sub_scores.remove(&category.id);
            if score.is_none() && subs.is_none() {
                continue;
            }

            let mut vote = CategoryVote::new(
                category.id.clone(),
                score.unwrap_or(0.0),
                VoteSource::ZeroShot,
            );
            let mut subs = subs.unwrap_or_default();
            subs.sort_by_key(|(id, _)| category.subcategory_position(id));
            for (sub, score) in subs {
                vote = vote.with_subcategory(sub, score);
            }
            votes.push(vote);
        }

        votes
    }
}

#[async_trait]
impl Classifier for ZeroShotClassifier {
    fn source(&self) -> VoteSource {
        VoteSource::ZeroShot
    }

    async fn score(&self, input: ScoringInput<'_>) -> SourceVotes {
        let call = self.scorer.classify(input.text.as_str(), &self.labels);

        match call_with_timeout(self.scorer.name(), self.timeout, call).await {
            Ok(scores) => SourceVotes::available(self.votes_from_scores(&scores)),
            Err(e) => {
                warn!(source = "zero_shot", reason = %e, "Source degraded");
                SourceVotes::degraded(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CapabilityError;
    use crate::taxonomy::CategoryLabel;

    struct Fixed(HashMap<String, f64>);

    #[async_trait]
    impl ZeroShotScorer for Fixed {
        fn name(&self) -> &str {
            "zero_shot"
        }

        async fn classify(
            &self,
            _text: &str,
            _labels: &[String],
        ) -> Result<HashMap<String, f64>, CapabilityError> {
            Ok(self.0.clone())
        }
    }

    fn taxonomy() -> Arc<Taxonomy> {
        Arc::new(
            Taxonomy::new(
                vec![
                    CategoryLabel::new("career", "Career & Studies")
                        .with_keywords(&["job"])
                        .with_subcategory("exam", "Exam Stress")
                        .with_subcategory("job_search", "Job Search"),
                    CategoryLabel::new("money", "Money").with_keywords(&["debt"]),
                ],
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_labels_follow_taxonomy() {
        let classifier = ZeroShotClassifier::new(
            taxonomy(),
            Arc::new(Fixed(HashMap::new())),
            Duration::from_secs(1),
        );
        assert_eq!(classifier.labels(), &["Career & Studies", "Money"]);

        let with_subs = classifier.with_subcategory_labels();
        assert_eq!(with_subs.labels().len(), 4);
        assert_eq!(with_subs.labels()[1], "Exam Stress in the context of Career & Studies");
    }

    #[test]
    fn test_scores_become_clipped_votes() {
        let classifier = ZeroShotClassifier::new(
            taxonomy(),
            Arc::new(Fixed(HashMap::new())),
            Duration::from_secs(1),
        )
        .with_subcategory_labels();

        let scores = HashMap::from([
            ("Career & Studies".to_string(), 1.4),
            ("Job Search in the context of Career & Studies".to_string(), 0.7),
            ("Weather".to_string(), 0.9),
        ]);
        let votes = classifier.votes_from_scores(&scores);

        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].score, 1.0);
        assert_eq!(votes[0].source, VoteSource::ZeroShot);
        assert_eq!(votes[0].subcategories[0].subcategory.as_str(), "job_search");
    }
}
