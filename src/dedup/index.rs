//! Append-only fingerprint arena.
//!
//! Entries are addressed by a stable `FingerprintHandle` equal to their
//! insertion position. Reads take a shared lock; appends take the write
//! lock, so two confirmations of the same text cannot both insert.

use std::collections::HashMap;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{AdviceRecord, DuplicateMatch, Fingerprint, FingerprintHandle};

#[derive(Debug, Clone)]
struct IndexEntry {
    fingerprint: Fingerprint,
    record_id: Uuid,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<IndexEntry>,
    by_hash: HashMap<String, FingerprintHandle>,
}

/// Result of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted(FingerprintHandle),

    /// The content hash was already indexed; nothing changed
    AlreadyIndexed(FingerprintHandle),
}

impl AppendOutcome {
    pub fn handle(&self) -> FingerprintHandle {
        match self {
            AppendOutcome::Inserted(h) | AppendOutcome::AlreadyIndexed(h) => *h,
        }
    }
}

#[derive(Debug, Default)]
pub struct FingerprintIndex {
    inner: RwLock<Inner>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored records, in store order.
    ///
    /// Records without a fingerprint are skipped.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AdviceRecord>) -> Self {
        let index = Self::new();
        for record in records {
            if let Some(fingerprint) = &record.fingerprint {
                index.append(fingerprint.clone(), record.id, &record.content_hash);
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_hash(&self, content_hash: &str) -> bool {
        self.inner.read().by_hash.contains_key(content_hash)
    }

    /// Append a confirmed fingerprint. Idempotent per content hash.
    pub fn append(
        &self,
        fingerprint: Fingerprint,
        record_id: Uuid,
        content_hash: &str,
    ) -> AppendOutcome {
        let mut inner = self.inner.write();

        if let Some(handle) = inner.by_hash.get(content_hash) {
            return AppendOutcome::AlreadyIndexed(*handle);
        }

        let handle = FingerprintHandle(inner.entries.len() as u64);
        inner.entries.push(IndexEntry {
            fingerprint,
            record_id,
        });
        inner.by_hash.insert(content_hash.to_string(), handle);

        AppendOutcome::Inserted(handle)
    }

    /// Highest-similarity entry strictly above `threshold`.
    ///
    /// Equal similarities resolve to the earliest insertion.
    pub fn check(&self, fingerprint: &Fingerprint, threshold: f64) -> Option<DuplicateMatch> {
        let inner = self.inner.read();
        let mut best: Option<DuplicateMatch> = None;

        for (position, entry) in inner.entries.iter().enumerate() {
            let similarity = fingerprint.cosine(&entry.fingerprint);
            if similarity <= threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(DuplicateMatch {
                    handle: FingerprintHandle(position as u64),
                    record_id: entry.record_id,
                    similarity,
                });
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(v: &[f32]) -> Fingerprint {
        Fingerprint::new(v.to_vec()).unwrap()
    }

    #[test]
    fn test_append_is_idempotent_per_hash() {
        let index = FingerprintIndex::new();
        let first = index.append(fp(&[1.0, 0.0]), Uuid::new_v4(), "h1");
        let again = index.append(fp(&[0.0, 1.0]), Uuid::new_v4(), "h1");

        assert_eq!(first, AppendOutcome::Inserted(FingerprintHandle(0)));
        assert_eq!(again, AppendOutcome::AlreadyIndexed(FingerprintHandle(0)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_check_prefers_highest_then_earliest() {
        let index = FingerprintIndex::new();
        let early = Uuid::new_v4();
        index.append(fp(&[1.0, 0.0]), early, "a");
        index.append(fp(&[1.0, 0.0]), Uuid::new_v4(), "b");
        index.append(fp(&[0.0, 1.0]), Uuid::new_v4(), "c");

        let found = index.check(&fp(&[1.0, 0.0]), 0.92).unwrap();
        assert_eq!(found.record_id, early);
        assert_eq!(found.handle, FingerprintHandle(0));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let index = FingerprintIndex::new();
        index.append(fp(&[1.0, 0.0]), Uuid::new_v4(), "a");
        assert!(index.check(&fp(&[1.0, 0.0]), 1.0).is_none());
        assert!(index.check(&fp(&[1.0, 0.0]), 0.99).is_some());
    }

    #[test]
    fn test_dimension_mismatch_never_matches() {
        let index = FingerprintIndex::new();
        index.append(fp(&[1.0, 0.0, 0.0]), Uuid::new_v4(), "a");
        assert!(index.check(&fp(&[1.0, 0.0]), 0.5).is_none());
    }
}
