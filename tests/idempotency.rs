//! Idempotency Integration Tests
//!
//! The fingerprint index holds one entry per content hash, no matter how
//! many commits race for it, and nothing reaches it without review.

use std::sync::Arc;

use advice_curator::adapters::HashingEmbedder;
use advice_curator::core::{CurateOutcome, ReviewError};
use advice_curator::dedup::{AppendOutcome, FingerprintIndex};
use advice_curator::domain::{Fingerprint, RawInput, ReviewMode};
use advice_curator::{
    AutoApprove, Curator, JsonlRecordStore, RecordStore, ReviewCandidate, ReviewDecision, Reviewer,
    Taxonomy,
};
use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

const TEXT: &str = "When money worries keep you awake, write down one small step for tomorrow.";

struct RejectAll;

#[async_trait]
impl Reviewer for RejectAll {
    fn mode(&self) -> ReviewMode {
        ReviewMode::Explicit
    }

    async fn review(&self, _candidate: &ReviewCandidate) -> Result<ReviewDecision, ReviewError> {
        Ok(ReviewDecision::Reject {
            reason: Some("off topic".to_string()),
        })
    }
}

async fn curator(temp: &TempDir) -> Curator {
    let store = Arc::new(
        JsonlRecordStore::open(temp.path().join("records.jsonl"))
            .await
            .unwrap(),
    );
    Curator::builder(
        Arc::new(Taxonomy::builtin().unwrap().clone()),
        store,
        Arc::new(HashingEmbedder::new(128)),
    )
    .build()
    .await
    .unwrap()
}

#[test]
fn test_concurrent_append_same_hash_indexes_once() {
    let index = FingerprintIndex::new();
    let fingerprint = Fingerprint::new(vec![0.6, 0.8]).unwrap();

    let outcomes: Vec<AppendOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let fingerprint = fingerprint.clone();
                let index = &index;
                scope.spawn(move || index.append(fingerprint, Uuid::new_v4(), "same-hash"))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let inserted = outcomes
        .iter()
        .filter(|o| matches!(o, AppendOutcome::Inserted(_)))
        .count();
    assert_eq!(inserted, 1);
    assert_eq!(index.len(), 1);
    assert!(index.contains_hash("same-hash"));

    // Every caller is pointed at the same entry
    let first = outcomes[0].handle();
    assert!(outcomes.iter().all(|o| o.handle() == first));
}

#[tokio::test]
async fn test_concurrent_curate_same_text() {
    let temp = TempDir::new().unwrap();
    let curator = curator(&temp).await;

    let (a, b) = tokio::join!(
        curator.curate(RawInput::from_text(TEXT), &AutoApprove),
        curator.curate(RawInput::from_text(TEXT), &AutoApprove)
    );

    let receipts: Vec<_> = [a.unwrap(), b.unwrap()]
        .into_iter()
        .map(|outcome| match outcome {
            CurateOutcome::Stored(receipt) => receipt,
            other => panic!("expected stored, got {:?}", other),
        })
        .collect();

    // Both records are kept; the index has one entry for the shared text
    assert_ne!(receipts[0].record_id, receipts[1].record_id);
    assert_eq!(curator.store().all().await.unwrap().len(), 2);
    assert_eq!(curator.index().len(), 1);

    let inserted = receipts
        .iter()
        .filter(|r| matches!(r.indexed, Some(AppendOutcome::Inserted(_))))
        .count();
    assert_eq!(inserted, 1);
}

#[tokio::test]
async fn test_rejected_input_is_never_indexed() {
    let temp = TempDir::new().unwrap();
    let curator = curator(&temp).await;

    let outcome = curator
        .curate(RawInput::from_text(TEXT), &RejectAll)
        .await
        .unwrap();

    match outcome {
        CurateOutcome::Rejected { reason, .. } => assert_eq!(reason.as_deref(), Some("off topic")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(curator.index().is_empty());
    assert!(curator.store().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reindex_after_restart_is_idempotent() {
    let temp = TempDir::new().unwrap();
    {
        let curator = curator(&temp).await;
        curator
            .curate(RawInput::from_text(TEXT), &AutoApprove)
            .await
            .unwrap();
        curator
            .curate(RawInput::from_text(TEXT), &AutoApprove)
            .await
            .unwrap();
    }

    let reopened = curator(&temp).await;
    assert_eq!(reopened.store().all().await.unwrap().len(), 2);
    assert_eq!(reopened.index().len(), 1);
}
