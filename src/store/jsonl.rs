//! Append-only record store with file-based persistence.
//!
//! Records are stored as newline-delimited JSON, one confirmed record per
//! line, so the file can be inspected and diffed by hand.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{render_export, ExportFilter, RecordStore, SearchQuery};
use crate::domain::{AdviceRecord, ConfirmedRecord};

pub struct JsonlRecordStore {
    path: PathBuf,

    /// Keeps concurrent appends from interleaving lines
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    /// Open (or prepare) a store at `path`, creating parent directories
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the store at the configured location (~/.curator/records.jsonl)
    pub async fn open_default() -> Result<Self> {
        Self::open(crate::config::records_path()?).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn replay(&self) -> Result<Vec<AdviceRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open records file: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut records = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: AdviceRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse record at line {}", line_no))?;
            records.push(record);
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn insert(&self, record: &ConfirmedRecord) -> Result<Uuid> {
        let json = serde_json::to_string(record).context("Failed to serialize record")?;

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open records file: {}", self.path.display()))?;

        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write record")?;
        file.flush().await.context("Failed to flush record")?;

        debug!(record_id = %record.id(), path = %self.path.display(), "Record appended");
        Ok(record.id())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<AdviceRecord>> {
        let mut found: Vec<AdviceRecord> = self
            .replay()
            .await?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();

        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn export(&self, filter: &ExportFilter) -> Result<Vec<u8>> {
        let records: Vec<AdviceRecord> = self
            .replay()
            .await?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();

        render_export(&records, filter.format)
    }

    async fn all(&self) -> Result<Vec<AdviceRecord>> {
        self.replay().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CategoryId, ReviewMode, ReviewProvenance};
    use crate::store::ExportFormat;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(category: &str, text: &str, confidence: f64) -> ConfirmedRecord {
        ConfirmedRecord::new(AdviceRecord {
            id: Uuid::new_v4(),
            category: CategoryId::new(category),
            subcategories: Vec::new(),
            confidence,
            text: text.to_string(),
            original_text: text.to_string(),
            language: "en".to_string(),
            content_hash: format!("hash-{}", text),
            source: None,
            review: ReviewProvenance {
                mode: ReviewMode::Implicit,
                edited: false,
                reviewer: None,
                confirmed_at: Utc::now(),
            },
            breakdown: Vec::new(),
            duplicate_of: None,
            warnings: Vec::new(),
            fingerprint: None,
        })
    }

    async fn create_test_store() -> (JsonlRecordStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::open(temp_dir.path().join("nested").join("records.jsonl"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_and_replay_order() {
        let (store, _temp) = create_test_store().await;
        assert!(store.all().await.unwrap().is_empty());

        for i in 0..3 {
            store
                .insert(&record("spiritual", &format!("entry {}", i), 0.5))
                .await
                .unwrap();
        }

        let records = store.all().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].text, "entry 2");
    }

    #[tokio::test]
    async fn test_search_filters() {
        let (store, _temp) = create_test_store().await;
        store.insert(&record("spiritual", "Find Peace within", 0.9)).await.unwrap();
        store.insert(&record("money_finance", "Peace of mind needs savings", 0.6)).await.unwrap();
        store.insert(&record("spiritual", "Pray daily", 0.7)).await.unwrap();

        let hits = store.search(&SearchQuery::new("peace")).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store
            .search(&SearchQuery::new("PEACE").with_category(CategoryId::new("spiritual")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Find Peace within");

        let hits = store.search(&SearchQuery::new("").with_limit(2)).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_export_csv_and_stats() {
        let (store, _temp) = create_test_store().await;
        store.insert(&record("spiritual", "Be still, and breathe", 0.9)).await.unwrap();
        store.insert(&record("spiritual", "Low score", 0.2)).await.unwrap();

        let filter = ExportFilter {
            min_confidence: Some(0.5),
            format: ExportFormat::Csv,
            ..Default::default()
        };
        let csv = String::from_utf8(store.export(&filter).await.unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"Be still, and breathe\""));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category[&CategoryId::new("spiritual")], 2);
        assert!((stats.mean_confidence - 0.55).abs() < 1e-9);
    }
}
