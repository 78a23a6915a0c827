//! Core pipeline logic.
//!
//! This module contains:
//! - Fuser: weighted ensemble over classifier votes
//! - ReviewGate: the only producer of confirmed records
//! - Curator: main execution engine
//! - Error types shared across the pipeline

pub mod error;
pub mod fuser;
pub mod orchestrator;
pub mod review;

// Re-export commonly used types
pub use error::{ConfigurationError, CuratorError};
pub use fuser::{FusionConfig, Fuser, SourceWeights, VotesBySource};
pub use orchestrator::{BatchItem, CommitReceipt, CurateOutcome, Curator, CuratorBuilder, Timeouts};
pub use review::{
    AutoApprove, ReviewCandidate, ReviewDecision, ReviewError, ReviewGate, ReviewOutcome,
    ReviewOverride, Reviewer,
};
