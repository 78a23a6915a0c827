//! Record persistence.
//!
//! The pipeline only ever hands a store `ConfirmedRecord`s. Stores keep the
//! fingerprint with each record so the duplicate index can be rebuilt at
//! startup from `all()`.

pub mod jsonl;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AdviceRecord, CategoryId, ConfirmedRecord, ReviewMode};

pub use jsonl::JsonlRecordStore;

/// Substring search over stored records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub category: Option<CategoryId>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Case-insensitive match on cleaned or original text
    pub fn matches(&self, record: &AdviceRecord) -> bool {
        if let Some(category) = &self.category {
            if &record.category != category {
                return false;
            }
        }

        let needle = self.text.to_lowercase();
        needle.is_empty()
            || record.text.to_lowercase().contains(&needle)
            || record.original_text.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportFilter {
    pub category: Option<CategoryId>,
    pub min_confidence: Option<f64>,
    pub format: ExportFormat,
}

impl ExportFilter {
    pub fn matches(&self, record: &AdviceRecord) -> bool {
        self.category.as_ref().map_or(true, |c| &record.category == c)
            && self.min_confidence.map_or(true, |m| record.confidence >= m)
    }
}

/// Totals over the stored records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_category: BTreeMap<CategoryId, usize>,
    pub edited: usize,
    pub implicit: usize,
    pub explicit: usize,
    pub with_duplicate_warning: usize,
    pub mean_confidence: f64,
}

impl StoreStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AdviceRecord>) -> Self {
        let mut stats = Self::default();
        let mut confidence_sum = 0.0;

        for record in records {
            stats.total += 1;
            *stats.by_category.entry(record.category.clone()).or_default() += 1;
            confidence_sum += record.confidence;

            if record.review.edited {
                stats.edited += 1;
            }
            match record.review.mode {
                ReviewMode::Implicit => stats.implicit += 1,
                ReviewMode::Explicit => stats.explicit += 1,
            }
            if record.duplicate_of.is_some() {
                stats.with_duplicate_warning += 1;
            }
        }

        if stats.total > 0 {
            stats.mean_confidence = confidence_sum / stats.total as f64;
        }
        stats
    }
}

/// Persistence collaborator for confirmed records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a confirmed record and return its id
    async fn insert(&self, record: &ConfirmedRecord) -> Result<Uuid>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<AdviceRecord>>;

    /// Serialize the records passing `filter`
    async fn export(&self, filter: &ExportFilter) -> Result<Vec<u8>>;

    /// Every stored record, in insertion order
    async fn all(&self) -> Result<Vec<AdviceRecord>>;

    async fn stats(&self) -> Result<StoreStats> {
        let records = self.all().await?;
        Ok(StoreStats::from_records(&records))
    }
}

const CSV_HEADER: [&str; 9] = [
    "id",
    "category",
    "subcategories",
    "confidence",
    "text",
    "original_text",
    "language",
    "review_mode",
    "confirmed_at",
];

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render records as a JSON array or CSV bytes
pub fn render_export(records: &[AdviceRecord], format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            serde_json::to_vec_pretty(records).context("Failed to serialize records as JSON")
        }
        ExportFormat::Csv => {
            let mut out = CSV_HEADER.join(",");
            out.push('\n');

            for record in records {
                let subcategories = record
                    .subcategories
                    .iter()
                    .map(|s| s.id.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let mode = match record.review.mode {
                    ReviewMode::Implicit => "implicit",
                    ReviewMode::Explicit => "explicit",
                };
                let row = [
                    record.id.to_string(),
                    record.category.to_string(),
                    subcategories,
                    format!("{:.4}", record.confidence),
                    record.text.clone(),
                    record.original_text.clone(),
                    record.language.clone(),
                    mode.to_string(),
                    record.review.confirmed_at.to_rfc3339(),
                ];
                let line = row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
                out.push_str(&line);
                out.push('\n');
            }

            Ok(out.into_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_empty_export() {
        let json = render_export(&[], ExportFormat::Json).unwrap();
        assert_eq!(String::from_utf8(json).unwrap(), "[]");

        let csv = render_export(&[], ExportFormat::Csv).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "id,category,subcategories,confidence,text,original_text,language,review_mode,confirmed_at\n"
        );
    }

    #[test]
    fn test_stats_of_nothing() {
        let stats = StoreStats::from_records(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.mean_confidence, 0.0);
    }
}
