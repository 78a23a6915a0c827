//! Category classifiers.
//!
//! Every classifier implements the same `Classifier` interface so the
//! fuser can treat them uniformly:
//! - `KeywordClassifier`: curated term lists, deterministic
//! - `SemanticClassifier`: fingerprint vs category prototypes
//! - `ZeroShotClassifier`: external label scorer with a timeout
//!
//! A classifier never fails. When it cannot run it returns
//! `SourceVotes::Degraded` with the reason.

pub mod keyword;
pub mod semantic;
pub mod zero_shot;

use async_trait::async_trait;

use crate::adapters::CapabilityError;
use crate::domain::{Fingerprint, NormalizedText, SourceVotes, VoteSource};

pub use keyword::KeywordClassifier;
pub use semantic::SemanticClassifier;
pub use zero_shot::ZeroShotClassifier;

/// What a classifier gets to look at
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub text: &'a NormalizedText,

    /// The text's fingerprint, or why it could not be computed
    pub fingerprint: Result<&'a Fingerprint, &'a CapabilityError>,
}

impl<'a> ScoringInput<'a> {
    pub fn new(
        text: &'a NormalizedText,
        fingerprint: Result<&'a Fingerprint, &'a CapabilityError>,
    ) -> Self {
        Self { text, fingerprint }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Which source tag this classifier's votes carry
    fn source(&self) -> VoteSource;

    async fn score(&self, input: ScoringInput<'_>) -> SourceVotes;
}
