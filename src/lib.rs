//! advice-curator - normalization, near-duplicate detection and ensemble
//! categorization for short advice texts
//!
//! # Architecture
//!
//! Every input flows through one pipeline:
//! - The normalizer decodes, cleans and language-tags the text while
//!   keeping protected spiritual terms verbatim
//! - An embedding fingerprint feeds the duplicate detector and the
//!   semantic classifier
//! - Keyword, semantic and zero-shot classifiers vote independently; the
//!   fuser combines them with weights redistributed away from any source
//!   that degraded (timeout or failure)
//! - A review gate turns the result into a confirmed record, which alone
//!   may be stored and indexed
//!
//! # Modules
//!
//! - `adapters`: External capabilities (embeddings, zero-shot scoring)
//! - `classify`: The three vote sources
//! - `core`: Fuser, review gate and the `Curator` orchestrator
//! - `dedup`: Fingerprint index and duplicate detector
//! - `domain`: Data structures (inputs, votes, results, records)
//! - `normalize`: Text normalizer
//! - `store`: Record persistence
//! - `taxonomy`: Category taxonomy and prototypes
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Curate one text, reviewing interactively
//! echo "Breathe before you answer." | curator process
//!
//! # Auto-approve a batch
//! curator batch advice.jsonl --yes --jobs 8
//!
//! # Export what was stored
//! curator export --format csv --min-confidence 0.5
//! ```

pub mod adapters;
pub mod classify;
pub mod cli;
pub mod config;
pub mod core;
pub mod dedup;
pub mod domain;
pub mod normalize;
pub mod store;
pub mod taxonomy;

// Re-export main types at crate root for convenience
pub use crate::core::{
    AutoApprove, ConfigurationError, CurateOutcome, Curator, CuratorError, ReviewCandidate,
    ReviewDecision, ReviewGate, Reviewer,
};
pub use domain::{AdviceRecord, ClassificationResult, ConfirmedRecord, NormalizedText, RawInput};
pub use normalize::{Normalizer, NormalizerOptions};
pub use store::{JsonlRecordStore, RecordStore};
pub use taxonomy::Taxonomy;
