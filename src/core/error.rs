//! Error types shared across the pipeline.

use thiserror::Error;

use crate::core::review::ReviewError;
use crate::normalize::NormalizeError;

/// Problems with static configuration or taxonomy data. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Failed to parse taxonomy: {0}")]
    TaxonomyParse(String),

    #[error("Taxonomy must define {expected} categories, found {actual}")]
    CategoryCount { expected: usize, actual: usize },

    #[error("Duplicate category id: {0}")]
    DuplicateCategory(String),

    #[error("Duplicate subcategory '{subcategory}' in category '{category}'")]
    DuplicateSubcategory { category: String, subcategory: String },

    #[error("Category '{category}' has {count} subcategories (max {max})")]
    TooManySubcategories {
        category: String,
        count: usize,
        max: usize,
    },

    #[error("Category '{0}' has no keywords")]
    EmptyKeywords(String),

    #[error("Category '{0}' has no prototype embedding")]
    MissingPrototype(String),

    #[error("Could not derive prototype for '{category}': {reason}")]
    PrototypeDerivation { category: String, reason: String },

    #[error("Prototype for '{category}' has dimension {actual}, expected {expected}")]
    PrototypeDimension {
        category: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid source weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid {name}: {value} (must be within [0, 1])")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Fallback category '{0}' is not in the taxonomy")]
    UnknownFallbackCategory(String),

    #[error("Invalid protected terms: {0}")]
    InvalidProtectedTerms(String),
}

/// Top-level error for pipeline operations
#[derive(Debug, Error)]
pub enum CuratorError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error("Record store failure: {0}")]
    Store(#[from] anyhow::Error),
}
