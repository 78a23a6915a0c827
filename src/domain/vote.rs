//! Category votes emitted by the classifiers.

use serde::{Deserialize, Serialize};

/// Taxonomy category identifier (e.g. "relationships")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Subcategory identifier, unique within its category
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubcategoryId(String);

impl SubcategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubcategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubcategoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which classifier produced a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteSource {
    Keyword,
    Semantic,
    ZeroShot,
}

impl VoteSource {
    pub const ALL: [VoteSource; 3] = [VoteSource::Keyword, VoteSource::Semantic, VoteSource::ZeroShot];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteSource::Keyword => "keyword",
            VoteSource::Semantic => "semantic",
            VoteSource::ZeroShot => "zero_shot",
        }
    }

    /// Tie-break rank: zero-shot > semantic > keyword
    pub fn priority(&self) -> u8 {
        match self {
            VoteSource::ZeroShot => 3,
            VoteSource::Semantic => 2,
            VoteSource::Keyword => 1,
        }
    }

    /// Sources ordered from highest to lowest tie-break priority
    pub fn by_priority() -> [VoteSource; 3] {
        [VoteSource::ZeroShot, VoteSource::Semantic, VoteSource::Keyword]
    }
}

impl std::fmt::Display for VoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Score for one subcategory inside a vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubcategoryVote {
    pub subcategory: SubcategoryId,
    pub score: f64,
}

/// One classifier's opinion about one category.
///
/// Scores are always in [0, 1]; ids always exist in the taxonomy the
/// classifier was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVote {
    pub category: CategoryId,

    /// Subcategory-level scores, empty when the source has no granularity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcategories: Vec<SubcategoryVote>,

    pub score: f64,

    pub source: VoteSource,
}

impl CategoryVote {
    /// Create a vote, clipping the score to [0, 1]
    pub fn new(category: CategoryId, score: f64, source: VoteSource) -> Self {
        Self {
            category,
            subcategories: Vec::new(),
            score: clip_unit(score),
            source,
        }
    }

    /// Attach a subcategory score (clipped to [0, 1])
    pub fn with_subcategory(mut self, subcategory: SubcategoryId, score: f64) -> Self {
        self.subcategories.push(SubcategoryVote {
            subcategory,
            score: clip_unit(score),
        });
        self
    }
}

/// Everything one classifier said about an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceVotes {
    Available { votes: Vec<CategoryVote> },

    /// The source could not run; it contributes nothing to fusion
    Degraded { reason: String },
}

impl SourceVotes {
    pub fn available(votes: Vec<CategoryVote>) -> Self {
        Self::Available { votes }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SourceVotes::Available { .. })
    }

    pub fn votes(&self) -> &[CategoryVote] {
        match self {
            SourceVotes::Available { votes } => votes,
            SourceVotes::Degraded { .. } => &[],
        }
    }
}

/// Clip to [0, 1]; NaN maps to 0
pub(crate) fn clip_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
