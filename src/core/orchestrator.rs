//! Pipeline orchestrator.
//!
//! Runs one input through the pipeline:
//! normalize -> embed -> (duplicate lookup | keyword | semantic | zero-shot)
//! -> fuse -> annotate -> review -> commit.
//!
//! Every external call is bounded by a timeout. A failed call degrades
//! the affected source and shows up as a warning; it never fails the
//! input.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{call_with_timeout, CapabilityError, Embedder, ZeroShotScorer};
use crate::classify::{Classifier, KeywordClassifier, ScoringInput, SemanticClassifier, ZeroShotClassifier};
use crate::dedup::{AppendOutcome, DuplicateCheck, DuplicateDetector, FingerprintIndex, DEFAULT_THRESHOLD};
use crate::domain::{
    ConfirmedRecord, Fingerprint, NormalizedText, RawInput, ReviewWarning, SourceVotes, VoteSource,
};
use crate::normalize::{check_originality, Normalizer, NormalizerOptions};
use crate::store::RecordStore;
use crate::taxonomy::{derive_prototypes, Taxonomy};

use super::error::CuratorError;
use super::fuser::{FusionConfig, Fuser, VotesBySource};
use super::review::{ReviewCandidate, ReviewGate, ReviewOutcome, Reviewer};

fn default_embedding_ms() -> u64 {
    5_000
}
fn default_zero_shot_ms() -> u64 {
    10_000
}
fn default_dedup_lookup_ms() -> u64 {
    1_000
}

/// Per-call deadlines for the suspending operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_embedding_ms")]
    pub embedding_ms: u64,
    #[serde(default = "default_zero_shot_ms")]
    pub zero_shot_ms: u64,
    #[serde(default = "default_dedup_lookup_ms")]
    pub dedup_lookup_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedding_ms: default_embedding_ms(),
            zero_shot_ms: default_zero_shot_ms(),
            dedup_lookup_ms: default_dedup_lookup_ms(),
        }
    }
}

impl Timeouts {
    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }

    pub fn zero_shot(&self) -> Duration {
        Duration::from_millis(self.zero_shot_ms)
    }

    pub fn dedup_lookup(&self) -> Duration {
        Duration::from_millis(self.dedup_lookup_ms)
    }
}

/// What `commit` did
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub record_id: Uuid,

    /// None when the record had no fingerprint to index
    pub indexed: Option<AppendOutcome>,
}

/// Final disposition of one input
#[derive(Debug, Clone, PartialEq)]
pub enum CurateOutcome {
    Stored(CommitReceipt),
    Rejected { raw_id: Uuid, reason: Option<String> },
}

/// One batch entry's result
#[derive(Debug)]
pub struct BatchItem {
    pub position: usize,
    pub raw_id: Uuid,
    pub outcome: Result<CurateOutcome, CuratorError>,
}

pub struct CuratorBuilder {
    taxonomy: Arc<Taxonomy>,
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    zero_shot: Option<Arc<dyn ZeroShotScorer>>,
    zero_shot_subcategories: bool,
    subcategory_prototypes: bool,
    normalizer: NormalizerOptions,
    fusion: FusionConfig,
    dedup_threshold: f64,
    keyword_density_scale: Option<f64>,
    timeouts: Timeouts,
    index: Option<Arc<FingerprintIndex>>,
    max_parallel: usize,
}

impl CuratorBuilder {
    pub fn with_zero_shot(mut self, scorer: Arc<dyn ZeroShotScorer>) -> Self {
        self.zero_shot = Some(scorer);
        self
    }

    /// Score subcategory labels with the zero-shot capability too
    pub fn with_zero_shot_subcategories(mut self, enabled: bool) -> Self {
        self.zero_shot_subcategories = enabled;
        self
    }

    /// Derive subcategory prototypes for the semantic classifier
    pub fn with_subcategory_prototypes(mut self, enabled: bool) -> Self {
        self.subcategory_prototypes = enabled;
        self
    }

    pub fn with_normalizer(mut self, options: NormalizerOptions) -> Self {
        self.normalizer = options;
        self
    }

    pub fn with_fusion(mut self, config: FusionConfig) -> Self {
        self.fusion = config;
        self
    }

    pub fn with_dedup_threshold(mut self, threshold: f64) -> Self {
        self.dedup_threshold = threshold;
        self
    }

    pub fn with_keyword_density_scale(mut self, scale: f64) -> Self {
        self.keyword_density_scale = Some(scale);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Share an existing index instead of rebuilding one from the store
    pub fn with_index(mut self, index: Arc<FingerprintIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Derive missing prototypes, rebuild the duplicate index, and wire
    /// the classifiers.
    pub async fn build(self) -> Result<Curator, CuratorError> {
        let taxonomy = match self.taxonomy.require_prototypes() {
            Ok(_) if !self.subcategory_prototypes => Arc::clone(&self.taxonomy),
            _ => Arc::new(
                derive_prototypes(
                    &self.taxonomy,
                    self.embedder.as_ref(),
                    self.subcategory_prototypes,
                    self.timeouts.embedding(),
                )
                .await?,
            ),
        };

        let index = match self.index {
            Some(index) => index,
            None => {
                let records = self.store.all().await?;
                let index = FingerprintIndex::from_records(&records);
                info!(records = records.len(), indexed = index.len(), "Rebuilt duplicate index");
                Arc::new(index)
            }
        };

        let mut keyword = KeywordClassifier::new(&taxonomy)?;
        if let Some(scale) = self.keyword_density_scale {
            keyword = keyword.with_density_scale(scale);
        }

        let mut classifiers: Vec<Arc<dyn Classifier>> = vec![
            Arc::new(keyword),
            Arc::new(SemanticClassifier::new(Arc::clone(&taxonomy))?),
        ];
        if let Some(scorer) = self.zero_shot {
            let mut zero_shot =
                ZeroShotClassifier::new(Arc::clone(&taxonomy), scorer, self.timeouts.zero_shot());
            if self.zero_shot_subcategories {
                zero_shot = zero_shot.with_subcategory_labels();
            }
            classifiers.push(Arc::new(zero_shot));
        }

        Ok(Curator {
            normalizer: Normalizer::new(self.normalizer)?,
            embedder: self.embedder,
            detector: DuplicateDetector::new(index, self.dedup_threshold, self.timeouts.dedup_lookup())?,
            classifiers,
            fuser: Fuser::new(Arc::clone(&taxonomy), self.fusion)?,
            gate: ReviewGate::new(Arc::clone(&taxonomy)),
            taxonomy,
            store: self.store,
            timeouts: self.timeouts,
            max_parallel: self.max_parallel,
            commit_lock: tokio::sync::Mutex::new(()),
        })
    }
}

/// Main pipeline orchestrator
pub struct Curator {
    normalizer: Normalizer,
    embedder: Arc<dyn Embedder>,
    detector: DuplicateDetector,
    classifiers: Vec<Arc<dyn Classifier>>,
    fuser: Fuser,
    gate: ReviewGate,
    taxonomy: Arc<Taxonomy>,
    store: Arc<dyn RecordStore>,
    timeouts: Timeouts,
    max_parallel: usize,

    /// Serialises store insert + index append
    commit_lock: tokio::sync::Mutex<()>,
}

impl Curator {
    pub fn builder(
        taxonomy: Arc<Taxonomy>,
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
    ) -> CuratorBuilder {
        CuratorBuilder {
            taxonomy,
            store,
            embedder,
            zero_shot: None,
            zero_shot_subcategories: false,
            subcategory_prototypes: false,
            normalizer: NormalizerOptions::default(),
            fusion: FusionConfig::default(),
            dedup_threshold: DEFAULT_THRESHOLD,
            keyword_density_scale: None,
            timeouts: Timeouts::default(),
            index: None,
            max_parallel: 4,
        }
    }

    pub fn taxonomy(&self) -> &Arc<Taxonomy> {
        &self.taxonomy
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<FingerprintIndex> {
        self.detector.index()
    }

    async fn fingerprint(&self, text: &NormalizedText) -> Result<Fingerprint, CapabilityError> {
        let capability = self.embedder.name().to_string();
        let vector = call_with_timeout(
            &capability,
            self.timeouts.embedding(),
            self.embedder.embed(text.as_str()),
        )
        .await?;

        Fingerprint::new(vector)
            .ok_or_else(|| CapabilityError::failed(capability, "empty or non-finite embedding"))
    }

    /// Run an input up to the review gate
    #[instrument(skip(self, raw), fields(raw_id = %raw.id()))]
    pub async fn process(&self, raw: RawInput) -> Result<ReviewCandidate, CuratorError> {
        let text = self.normalizer.normalize(&raw)?;

        let fingerprint = self.fingerprint(&text).await;
        if let Err(e) = &fingerprint {
            warn!(source = "embedding", reason = %e, "Embedding unavailable");
        }

        let unavailable = fingerprint
            .as_ref()
            .err()
            .map(|e| format!("embedding unavailable: {}", e))
            .unwrap_or_default();
        let input = ScoringInput::new(&text, fingerprint.as_ref());

        let (duplicate, scored) = tokio::join!(
            self.detector.lookup(fingerprint.as_ref().ok(), &unavailable),
            join_all(
                self.classifiers
                    .iter()
                    .map(|c| async move { (c.source(), c.score(input).await) })
            )
        );

        let mut votes: VotesBySource = scored.into_iter().collect::<BTreeMap<_, _>>();
        votes.entry(VoteSource::ZeroShot).or_insert_with(|| {
            SourceVotes::degraded(
                CapabilityError::Unavailable {
                    capability: VoteSource::ZeroShot.as_str().to_string(),
                }
                .to_string(),
            )
        });

        let mut result = self.fuser.fuse(&votes);
        result.duplicate_of = duplicate.duplicate().cloned();

        let candidate = ReviewCandidate {
            warnings: Vec::new(),
            fingerprint: fingerprint.ok(),
            source: raw.source().cloned(),
            text,
            result,
        };
        let warnings = self.annotate(&candidate, &duplicate);

        info!(
            category = %candidate.result.category,
            confidence = candidate.result.confidence,
            warnings = warnings.len(),
            "Input classified"
        );

        Ok(ReviewCandidate {
            warnings,
            ..candidate
        })
    }

    fn annotate(&self, candidate: &ReviewCandidate, duplicate: &DuplicateCheck) -> Vec<ReviewWarning> {
        let text = &candidate.text;
        let result = &candidate.result;
        let mut warnings = Vec::new();

        if result.low_confidence {
            warnings.push(ReviewWarning::LowConfidence {
                confidence: result.confidence,
                minimum: self.fuser.config().min_confidence,
            });
        }

        for (source, reason) in result.degraded_sources() {
            warnings.push(ReviewWarning::DegradedSource {
                source: *source,
                reason: reason.to_string(),
            });
        }

        match duplicate {
            DuplicateCheck::Unchecked { reason } => warnings.push(ReviewWarning::DuplicateUnchecked {
                reason: reason.clone(),
            }),
            DuplicateCheck::Checked(Some(found)) => warnings.push(ReviewWarning::Duplicate {
                of: found.clone(),
            }),
            DuplicateCheck::Checked(None) => {}
        }

        if !text.language().supported {
            warnings.push(ReviewWarning::UnsupportedLanguage {
                language: text.language().code.clone(),
            });
        }

        if text.is_truncated() {
            warnings.push(ReviewWarning::Truncated {
                max_length: self.normalizer.options().max_length,
            });
        }

        if text.replaced_bytes() > 0 {
            warnings.push(ReviewWarning::ReplacedBytes {
                count: text.replaced_bytes(),
            });
        }

        let originality = check_originality(text.original_text(), text.as_str());
        if !originality.preserved {
            warnings.push(ReviewWarning::OriginalityLoss {
                preserved_ratio: originality.preserved_ratio,
                added_words: originality.words_added,
            });
        }

        warnings
    }

    /// Hand a candidate to the review gate
    pub async fn review(
        &self,
        candidate: ReviewCandidate,
        reviewer: &dyn Reviewer,
    ) -> Result<ReviewOutcome, CuratorError> {
        Ok(self.gate.present(candidate, reviewer).await?)
    }

    /// Persist a confirmed record, then index its fingerprint.
    ///
    /// The index is only touched after the store accepted the record.
    #[instrument(skip(self, confirmed), fields(record_id = %confirmed.id()))]
    pub async fn commit(&self, confirmed: ConfirmedRecord) -> Result<CommitReceipt, CuratorError> {
        let _guard = self.commit_lock.lock().await;

        let record_id = self.store.insert(&confirmed).await.map_err(|e| {
            error!(error = %e, "Record store insert failed");
            CuratorError::Store(e)
        })?;
        let indexed = self.detector.record(&confirmed);

        match indexed {
            Some(AppendOutcome::AlreadyIndexed(handle)) => {
                info!(%handle, "Record stored; fingerprint already indexed")
            }
            Some(AppendOutcome::Inserted(handle)) => info!(%handle, "Record stored and indexed"),
            None => warn!("Record stored without a fingerprint; not indexed"),
        }

        Ok(CommitReceipt { record_id, indexed })
    }

    /// Process, review and, when confirmed, commit one input
    pub async fn curate(
        &self,
        raw: RawInput,
        reviewer: &dyn Reviewer,
    ) -> Result<CurateOutcome, CuratorError> {
        let candidate = self.process(raw).await?;
        match self.review(candidate, reviewer).await? {
            ReviewOutcome::Confirmed(record) => Ok(CurateOutcome::Stored(self.commit(record).await?)),
            ReviewOutcome::Rejected { raw_id, reason } => Ok(CurateOutcome::Rejected { raw_id, reason }),
        }
    }

    /// Curate many inputs with bounded parallelism.
    ///
    /// Inputs are independent: one failure does not stop the others.
    /// Results come back in input order.
    #[instrument(skip(self, inputs, reviewer), fields(count = inputs.len()))]
    pub async fn batch(&self, inputs: Vec<RawInput>, reviewer: &dyn Reviewer) -> Vec<BatchItem> {
        info!(max_parallel = self.max_parallel, "Starting batch");

        let items: Vec<BatchItem> = stream::iter(inputs.into_iter().enumerate())
            .map(|(position, raw)| async move {
                let raw_id = raw.id();
                let outcome = self.curate(raw, reviewer).await;
                if let Err(e) = &outcome {
                    warn!(position, %raw_id, error = %e, "Batch input failed");
                }
                BatchItem {
                    position,
                    raw_id,
                    outcome,
                }
            })
            .buffered(self.max_parallel)
            .collect()
            .await;

        let stored = items
            .iter()
            .filter(|i| matches!(i.outcome, Ok(CurateOutcome::Stored(_))))
            .count();
        info!(total = items.len(), stored, "Batch finished");

        items
    }
}
