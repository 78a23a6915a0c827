//! Record Store Integration Tests
//!
//! End-to-end curation into a JSONL store, index rebuild on restart and
//! export of what was stored.

use std::sync::Arc;

use advice_curator::adapters::HashingEmbedder;
use advice_curator::domain::{AdviceRecord, RawInput, ReviewMode, ReviewWarning, SourceMetadata};
use advice_curator::store::{ExportFilter, ExportFormat, SearchQuery};
use advice_curator::{AutoApprove, CurateOutcome, Curator, JsonlRecordStore, RecordStore, Taxonomy};
use tempfile::TempDir;

const BREAKUP: &str = "My partner and I had a breakup and I still love her; my family says move on.";
const SAVINGS: &str = "Save a little money every month, even when the salary is small.";

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

#[tokio::test]
async fn test_curate_end_to_end() {
    let temp = TempDir::new().unwrap();
    let curator = curator(&temp).await;

    let raw = RawInput::from_text(BREAKUP).with_source(SourceMetadata {
        label: Some("forum".to_string()),
        ..Default::default()
    });
    let candidate = curator.process(raw.clone()).await.unwrap();
    let expected_category = candidate.result.category.clone();

    let outcome = curator.curate(raw, &AutoApprove).await.unwrap();
    let receipt = match outcome {
        CurateOutcome::Stored(receipt) => receipt,
        other => panic!("expected stored, got {:?}", other),
    };

    let records = curator.store().all().await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, receipt.record_id);
    assert_eq!(record.category, expected_category);
    assert_eq!(record.original_text, BREAKUP);
    assert_eq!(record.review.mode, ReviewMode::Implicit);
    assert!(!record.review.edited);
    assert!(record.fingerprint.is_some());
    assert_eq!(record.breakdown.len(), 3);
    assert_eq!(
        record.source.as_ref().and_then(|s| s.label.as_deref()),
        Some("forum")
    );
    assert_eq!(curator.index().len(), 1);
}

#[tokio::test]
async fn test_restart_rebuilds_index_and_flags_duplicate() {
    let temp = TempDir::new().unwrap();
    {
        let curator = curator(&temp).await;
        curator
            .curate(RawInput::from_text(BREAKUP), &AutoApprove)
            .await
            .unwrap();
    }

    let reopened = curator(&temp).await;
    assert_eq!(reopened.index().len(), 1);

    let stored_id = reopened.store().all().await.unwrap()[0].id;
    let candidate = reopened
        .process(RawInput::from_text(BREAKUP))
        .await
        .unwrap();

    let duplicate = candidate.result.duplicate_of.as_ref().unwrap();
    assert_eq!(duplicate.record_id, stored_id);
    assert!(candidate
        .warnings
        .iter()
        .any(|w| matches!(w, ReviewWarning::Duplicate { of } if of.record_id == stored_id)));

    // An unrelated text is not flagged
    let other = reopened
        .process(RawInput::from_text(SAVINGS))
        .await
        .unwrap();
    assert!(other.result.duplicate_of.is_none());
}

#[tokio::test]
async fn test_search_and_export_after_batch() {
    let temp = TempDir::new().unwrap();
    let curator = curator(&temp).await;

    let items = curator
        .batch(
            vec![
                RawInput::from_text(BREAKUP),
                RawInput::from_text("   "),
                RawInput::from_text(SAVINGS),
            ],
            &AutoApprove,
        )
        .await;

    // Results come back in input order; the blank input fails alone
    let positions: Vec<usize> = items.iter().map(|i| i.position).collect();
    assert_eq!(positions, [0, 1, 2]);
    assert!(items[0].outcome.is_ok());
    assert!(items[1].outcome.is_err());
    assert!(items[2].outcome.is_ok());

    let store = curator.store();
    let hits = store.search(&SearchQuery::new("SALARY")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].original_text, SAVINGS);

    let json = store.export(&ExportFilter::default()).await.unwrap();
    let exported: Vec<AdviceRecord> = serde_json::from_slice(&json).unwrap();
    let stored = store.all().await.unwrap();
    assert_eq!(exported.len(), 2);
    for (a, b) in exported.iter().zip(&stored) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.category, b.category);
        assert_eq!(a.text, b.text);
    }

    let csv = store
        .export(&ExportFilter {
            format: ExportFormat::Csv,
            ..Default::default()
        })
        .await
        .unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.starts_with("id,category,"));

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.implicit, 2);
}
