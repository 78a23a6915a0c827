//! Domain types for the advice curation pipeline.
//!
//! This module contains the data structures that flow through the pipeline:
//! - RawInput: text as received, immutable
//! - NormalizedText: cleaned text plus language and protected-term spans
//! - Fingerprint: semantic embedding used for dedup and semantic scoring
//! - CategoryVote: one classifier's opinion about one category
//! - ClassificationResult: fused decision handed to the review gate
//! - ConfirmedRecord: the only value a record store accepts

pub mod fingerprint;
pub mod input;
pub mod record;
pub mod result;
pub mod text;
pub mod vote;

pub use fingerprint::{DuplicateMatch, Fingerprint, FingerprintHandle};
pub use input::{RawInput, SourceMetadata};
pub use record::{AdviceRecord, ConfirmedRecord, ReviewMode, ReviewProvenance};
pub use result::{
    CategoryScore, ClassificationResult, ReviewWarning, ScoredSubcategory, SourceBreakdown,
    SourceStatus,
};
pub use text::{Change, LanguageTag, NormalizedText, SourceEncoding, TermSpan, TextStats};
pub use vote::{CategoryId, CategoryVote, SourceVotes, SubcategoryId, SubcategoryVote, VoteSource};
