//! Rule-based keyword scorer.
//!
//! Category score is keyword density (matched occurrences per word)
//! times a scale factor, capped at 1.0. Matching is case-insensitive and
//! word-bounded, and skips matches that fall inside a protected-term
//! span unless that protected term is the keyword itself.

use std::collections::BTreeSet;

use async_trait::async_trait;
use regex::Regex;

use super::{Classifier, ScoringInput};
use crate::core::error::ConfigurationError;
use crate::domain::{CategoryId, CategoryVote, NormalizedText, SourceVotes, SubcategoryId, VoteSource};
use crate::normalize::language::is_english_stopword;
use crate::taxonomy::Taxonomy;

/// Density multiplier; ten keyword hits per hundred words saturate
pub const DEFAULT_DENSITY_SCALE: f64 = 10.0;

/// Shortest subcategory-name word that counts as a cue
const MIN_CUE_LEN: usize = 3;

struct KeywordPattern {
    keyword: String,
    regex: Regex,
}

struct SubcategoryCues {
    id: SubcategoryId,
    cues: Vec<KeywordPattern>,
}

struct CategoryMatcher {
    category: CategoryId,
    keywords: Vec<KeywordPattern>,
    subcategories: Vec<SubcategoryCues>,
}

fn word_regex(term: &str) -> Result<Regex, ConfigurationError> {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(term.trim()));
    Regex::new(&pattern).map_err(|e| ConfigurationError::TaxonomyParse(e.to_string()))
}

impl KeywordPattern {
    fn new(term: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            keyword: term.trim().to_lowercase(),
            regex: word_regex(term)?,
        })
    }

    /// Occurrences in the text. A match inside a protected span only
    /// counts when the protected term is this keyword.
    fn count_in(&self, text: &NormalizedText) -> usize {
        self.regex
            .find_iter(text.as_str())
            .filter(|m| {
                text.protected_spans()
                    .iter()
                    .filter(|s| m.start() < s.end && s.start < m.end())
                    .all(|s| s.term.eq_ignore_ascii_case(&self.keyword))
            })
            .count()
    }
}

pub struct KeywordClassifier {
    matchers: Vec<CategoryMatcher>,
    density_scale: f64,
}

impl KeywordClassifier {
    /// Compile keyword and subcategory-cue patterns for every category
    pub fn new(taxonomy: &Taxonomy) -> Result<Self, ConfigurationError> {
        let mut matchers = Vec::with_capacity(taxonomy.len());

        for category in taxonomy.categories() {
            let keywords = category
                .keywords
                .iter()
                .filter(|k| !k.trim().is_empty())
                .map(|k| KeywordPattern::new(k))
                .collect::<Result<Vec<_>, ConfigurationError>>()?;

            let mut subcategories = Vec::with_capacity(category.subcategories.len());
            for sub in &category.subcategories {
                let words: BTreeSet<String> = sub
                    .name
                    .split(|c: char| !c.is_alphabetic())
                    .map(str::to_lowercase)
                    .filter(|w| w.chars().count() >= MIN_CUE_LEN && !is_english_stopword(w))
                    .collect();
                let cues = words
                    .iter()
                    .map(|w| KeywordPattern::new(w))
                    .collect::<Result<Vec<_>, _>>()?;
                subcategories.push(SubcategoryCues {
                    id: sub.id.clone(),
                    cues,
                });
            }

            matchers.push(CategoryMatcher {
                category: category.id.clone(),
                keywords,
                subcategories,
            });
        }

        Ok(Self {
            matchers,
            density_scale: DEFAULT_DENSITY_SCALE,
        })
    }

    pub fn with_density_scale(mut self, scale: f64) -> Self {
        self.density_scale = scale.max(0.0);
        self
    }

    /// Score a normalized text. Pure and deterministic.
    pub fn score_text(&self, text: &NormalizedText) -> Vec<CategoryVote> {
        let words = text.stats().word_count.max(1) as f64;
        let mut votes = Vec::new();

        for matcher in &self.matchers {
            let hits: usize = matcher
                .keywords
                .iter()
                .map(|k| k.count_in(text))
                .sum();
            if hits == 0 {
                continue;
            }

            let density = hits as f64 / words;
            let mut vote = CategoryVote::new(
                matcher.category.clone(),
                (density * self.density_scale).min(1.0),
                VoteSource::Keyword,
            );

            for sub in &matcher.subcategories {
                if sub.cues.is_empty() {
                    continue;
                }
                let found = sub
                    .cues
                    .iter()
                    .filter(|cue| cue.count_in(text) > 0)
                    .count();
                if found > 0 {
                    vote = vote.with_subcategory(sub.id.clone(), found as f64 / sub.cues.len() as f64);
                }
            }

            votes.push(vote);
        }

        votes
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn source(&self) -> VoteSource {
        VoteSource::Keyword
    }

    async fn score(&self, input: ScoringInput<'_>) -> SourceVotes {
        SourceVotes::available(self.score_text(input.text))
    }
}
