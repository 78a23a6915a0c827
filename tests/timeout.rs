//! Timeout Integration Tests
//!
//! Slow and failing capabilities degrade their source instead of
//! blocking or failing the pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use advice_curator::adapters::{CapabilityError, Embedder, HashingEmbedder, ZeroShotScorer};
use advice_curator::core::{ConfigurationError, Curator, CuratorError, Timeouts};
use advice_curator::domain::{RawInput, ReviewWarning, SourceStatus, VoteSource};
use advice_curator::taxonomy::derive_prototypes;
use advice_curator::{JsonlRecordStore, Taxonomy};
use async_trait::async_trait;
use tempfile::TempDir;

const TEXT: &str = "After the breakup I still love her, and my family keeps fighting about it.";

struct SlowEmbedder(Duration);

#[async_trait]
impl Embedder for SlowEmbedder {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CapabilityError> {
        tokio::time::sleep(self.0).await;
        Ok(vec![1.0; 64])
    }
}

struct SlowZeroShot(Duration);

#[async_trait]
impl ZeroShotScorer for SlowZeroShot {
    fn name(&self) -> &str {
        "zero_shot"
    }

    async fn classify(
        &self,
        _text: &str,
        _labels: &[String],
    ) -> Result<HashMap<String, f64>, CapabilityError> {
        tokio::time::sleep(self.0).await;
        Ok(HashMap::new())
    }
}

struct FailingZeroShot;

#[async_trait]
impl ZeroShotScorer for FailingZeroShot {
    fn name(&self) -> &str {
        "zero_shot"
    }

    async fn classify(
        &self,
        _text: &str,
        _labels: &[String],
    ) -> Result<HashMap<String, f64>, CapabilityError> {
        Err(CapabilityError::failed("zero_shot", "HTTP 503"))
    }
}

/// Scores every label mentioning relationships high
struct FixedZeroShot;

#[async_trait]
impl ZeroShotScorer for FixedZeroShot {
    fn name(&self) -> &str {
        "zero_shot"
    }

    async fn classify(
        &self,
        _text: &str,
        labels: &[String],
    ) -> Result<HashMap<String, f64>, CapabilityError> {
        Ok(labels
            .iter()
            .map(|l| {
                let score = if l.starts_with("Relationships") { 0.9 } else { 0.05 };
                (l.clone(), score)
            })
            .collect())
    }
}

fn short_timeouts() -> Timeouts {
    Timeouts {
        embedding_ms: 50,
        zero_shot_ms: 50,
        dedup_lookup_ms: 500,
    }
}

async fn curator(
    embedder: Arc<dyn Embedder>,
    zero_shot: Option<Arc<dyn ZeroShotScorer>>,
) -> (Curator, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(
        JsonlRecordStore::open(temp.path().join("records.jsonl"))
            .await
            .unwrap(),
    );
    // Prototypes come from a local embedder; the fakes only serve lookups
    let taxonomy = derive_prototypes(
        Taxonomy::builtin().unwrap(),
        &HashingEmbedder::new(64),
        false,
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    let mut builder =
        Curator::builder(Arc::new(taxonomy), store, embedder).with_timeouts(short_timeouts());
    if let Some(scorer) = zero_shot {
        builder = builder.with_zero_shot(scorer);
    }
    (builder.build().await.unwrap(), temp)
}

fn status(candidate: &advice_curator::ReviewCandidate, source: VoteSource) -> SourceStatus {
    candidate
        .result
        .breakdown
        .iter()
        .find(|b| b.source == source)
        .map(|b| b.status.clone())
        .unwrap()
}

#[tokio::test]
async fn test_embedding_timeout_degrades_semantic_and_dedup() {
    let (curator, _temp) = curator(
        Arc::new(SlowEmbedder(Duration::from_secs(5))),
        Some(Arc::new(FixedZeroShot)),
    )
    .await;

    let started = Instant::now();
    let candidate = curator.process(RawInput::from_text(TEXT)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(candidate.fingerprint.is_none());
    assert_eq!(candidate.result.category.as_str(), "relationships");
    assert!(matches!(
        status(&candidate, VoteSource::Semantic),
        SourceStatus::Degraded { reason } if reason.contains("timed out")
    ));
    assert!(status(&candidate, VoteSource::Keyword).is_available());
    assert!(status(&candidate, VoteSource::ZeroShot).is_available());

    assert!(candidate.warnings.iter().any(|w| matches!(
        w,
        ReviewWarning::DegradedSource { source: VoteSource::Semantic, .. }
    )));
    assert!(candidate
        .warnings
        .iter()
        .any(|w| matches!(w, ReviewWarning::DuplicateUnchecked { .. })));
}

#[tokio::test]
async fn test_zero_shot_timeout_redistributes_weights() {
    let (curator, _temp) = curator(
        Arc::new(HashingEmbedder::new(64)),
        Some(Arc::new(SlowZeroShot(Duration::from_secs(5)))),
    )
    .await;

    let started = Instant::now();
    let candidate = curator.process(RawInput::from_text(TEXT)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let weights: HashMap<VoteSource, f64> = candidate
        .result
        .breakdown
        .iter()
        .map(|b| (b.source, b.effective_weight))
        .collect();
    assert!((weights[&VoteSource::Keyword] - 0.25 / 0.60).abs() < 1e-9);
    assert!((weights[&VoteSource::Semantic] - 0.35 / 0.60).abs() < 1e-9);
    assert_eq!(weights[&VoteSource::ZeroShot], 0.0);

    assert!(candidate.warnings.iter().any(|w| matches!(
        w,
        ReviewWarning::DegradedSource { source: VoteSource::ZeroShot, reason } if reason.contains("timed out")
    )));
    // The embedding worked, so duplicates were checked
    assert!(candidate.fingerprint.is_some());
    assert!(!candidate
        .warnings
        .iter()
        .any(|w| matches!(w, ReviewWarning::DuplicateUnchecked { .. })));
}

#[tokio::test]
async fn test_zero_shot_error_degrades() {
    let (curator, _temp) = curator(
        Arc::new(HashingEmbedder::new(64)),
        Some(Arc::new(FailingZeroShot)),
    )
    .await;

    let candidate = curator.process(RawInput::from_text(TEXT)).await.unwrap();
    assert!(matches!(
        status(&candidate, VoteSource::ZeroShot),
        SourceStatus::Degraded { reason } if reason.contains("HTTP 503")
    ));
}

#[tokio::test]
async fn test_unconfigured_zero_shot_is_reported() {
    let (curator, _temp) = curator(Arc::new(HashingEmbedder::new(64)), None).await;

    let candidate = curator.process(RawInput::from_text(TEXT)).await.unwrap();
    assert!(matches!(
        status(&candidate, VoteSource::ZeroShot),
        SourceStatus::Degraded { reason } if reason.contains("not configured")
    ));
    assert!(status(&candidate, VoteSource::Keyword).is_available());
    assert!(status(&candidate, VoteSource::Semantic).is_available());
}

#[tokio::test]
async fn test_everything_down_still_produces_a_result() {
    let (curator, _temp) = curator(
        Arc::new(SlowEmbedder(Duration::from_secs(5))),
        Some(Arc::new(FailingZeroShot)),
    )
    .await;

    // No keyword from any category
    let candidate = curator
        .process(RawInput::from_text("Hmm, the weather is grey today."))
        .await
        .unwrap();

    assert_eq!(candidate.result.confidence, 0.0);
    assert!(candidate.result.low_confidence);
    assert!(candidate.result.fallback);
    assert!(candidate
        .warnings
        .iter()
        .any(|w| matches!(w, ReviewWarning::LowConfidence { .. })));
}

#[tokio::test]
async fn test_build_with_hung_embedder_fails_fast() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(
        JsonlRecordStore::open(temp.path().join("records.jsonl"))
            .await
            .unwrap(),
    );

    // No stored prototypes, so building has to embed
    let build = Curator::builder(
        Arc::new(Taxonomy::builtin().unwrap().clone()),
        store,
        Arc::new(SlowEmbedder(Duration::from_secs(60))),
    )
    .with_timeouts(short_timeouts())
    .build();

    let result = tokio::time::timeout(Duration::from_secs(2), build)
        .await
        .expect("build must respect the embedding timeout");

    match result {
        Err(CuratorError::Configuration(ConfigurationError::PrototypeDerivation { reason, .. })) => {
            assert!(reason.contains("timed out"), "{}", reason)
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("build should fail when prototypes cannot be derived"),
    }
}
