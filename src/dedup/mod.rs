//! Near-duplicate detection over the confirmed-fingerprint index.

mod index;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::error::ConfigurationError;
use crate::domain::{ConfirmedRecord, DuplicateMatch, Fingerprint};

pub use index::{AppendOutcome, FingerprintIndex};

pub const DEFAULT_THRESHOLD: f64 = 0.92;

/// Outcome of a duplicate lookup
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateCheck {
    /// The index was consulted
    Checked(Option<DuplicateMatch>),

    /// No lookup happened; reported to the operator, never fatal
    Unchecked { reason: String },
}

impl DuplicateCheck {
    pub fn duplicate(&self) -> Option<&DuplicateMatch> {
        match self {
            DuplicateCheck::Checked(found) => found.as_ref(),
            DuplicateCheck::Unchecked { .. } => None,
        }
    }
}

pub struct DuplicateDetector {
    index: Arc<FingerprintIndex>,
    threshold: f64,
    lookup_timeout: Duration,
}

impl DuplicateDetector {
    pub fn new(
        index: Arc<FingerprintIndex>,
        threshold: f64,
        lookup_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::InvalidThreshold {
                name: "dedup threshold",
                value: threshold,
            });
        }
        Ok(Self {
            index,
            threshold,
            lookup_timeout,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn index(&self) -> &Arc<FingerprintIndex> {
        &self.index
    }

    /// Pure lookup against the index as it is right now
    pub fn check(&self, fingerprint: &Fingerprint) -> Option<DuplicateMatch> {
        self.index.check(fingerprint, self.threshold)
    }

    /// Bounded lookup.
    ///
    /// A missing fingerprint or an elapsed deadline degrades to
    /// `Unchecked`; the pipeline never blocks on the index.
    pub async fn lookup(&self, fingerprint: Option<&Fingerprint>, unavailable: &str) -> DuplicateCheck {
        let Some(fingerprint) = fingerprint else {
            warn!(reason = %unavailable, "Duplicate check skipped");
            return DuplicateCheck::Unchecked {
                reason: unavailable.to_string(),
            };
        };

        let index = Arc::clone(&self.index);
        let threshold = self.threshold;
        let fingerprint = fingerprint.clone();
        let search = tokio::task::spawn_blocking(move || index.check(&fingerprint, threshold));

        match tokio::time::timeout(self.lookup_timeout, search).await {
            Ok(Ok(found)) => {
                if let Some(m) = &found {
                    debug!(record_id = %m.record_id, similarity = m.similarity, "Near-duplicate found");
                }
                DuplicateCheck::Checked(found)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Duplicate lookup task failed");
                DuplicateCheck::Unchecked {
                    reason: format!("lookup failed: {}", e),
                }
            }
            Err(_) => {
                warn!(timeout_ms = self.lookup_timeout.as_millis() as u64, "Duplicate lookup timed out");
                DuplicateCheck::Unchecked {
                    reason: format!("lookup timed out after {:?}", self.lookup_timeout),
                }
            }
        }
    }

    /// Index a confirmed record's fingerprint.
    ///
    /// Only confirmed records reach here, so rejected texts are never
    /// indexed. Returns None when the record carries no fingerprint.
    pub fn record(&self, confirmed: &ConfirmedRecord) -> Option<AppendOutcome> {
        let fingerprint = confirmed.fingerprint()?.clone();
        let record = confirmed.record();
        Some(
            self.index
                .append(fingerprint, record.id, &record.content_hash),
        )
    }
}
