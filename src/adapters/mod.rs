//! Capability interfaces for external models.
//!
//! The pipeline never talks to a model directly. It goes through two
//! capabilities, each supplied at construction:
//! - `Embedder`: text -> fixed-length vector
//! - `ZeroShotScorer`: (text, labels) -> independent per-label scores
//!
//! Failures surface as `CapabilityError` and are always recoverable by
//! the caller: the affected source degrades, the pipeline carries on.

pub mod hashing;
pub mod ollama;
pub mod zero_shot;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use hashing::HashingEmbedder;
pub use ollama::HttpEmbedder;
pub use zero_shot::HttpZeroShot;

/// Failure of an external capability call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    #[error("{capability} timed out after {after:?}")]
    Timeout { capability: String, after: Duration },

    #[error("{capability} failed: {message}")]
    Failed { capability: String, message: String },

    #[error("{capability} is not configured")]
    Unavailable { capability: String },
}

impl CapabilityError {
    pub fn failed(capability: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Failed {
            capability: capability.into(),
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CapabilityError::Timeout { .. })
    }
}

/// Text embedding capability
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Human-readable capability name
    fn name(&self) -> &str;

    /// Embed a text into a vector of the capability's fixed dimension
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;
}

/// Zero-shot label scoring capability.
///
/// Scores are independent per label and need not sum to 1.
#[async_trait]
pub trait ZeroShotScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<HashMap<String, f64>, CapabilityError>;
}

/// Per-request deadline for HTTP adapters unless one is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client whose requests give up after `timeout`
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Await a capability call, converting an elapsed deadline into
/// `CapabilityError::Timeout`.
pub async fn call_with_timeout<T, F>(
    capability: &str,
    limit: Duration,
    call: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            capability: capability.to_string(),
            after: limit,
        }),
    }
}
