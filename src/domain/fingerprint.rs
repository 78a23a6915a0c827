//! Semantic fingerprints and duplicate matches.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed-length embedding of a normalized text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(Vec<f32>);

impl Fingerprint {
    /// Wrap an embedding vector. Returns None for empty or non-finite vectors.
    pub fn new(vector: Vec<f32>) -> Option<Self> {
        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self(vector))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Cosine similarity with another fingerprint
    pub fn cosine(&self, other: &Fingerprint) -> f64 {
        cosine_similarity(&self.0, &other.0)
    }
}

/// Cosine similarity of two vectors.
///
/// Mismatched dimensions and zero vectors yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Stable handle into the append-only fingerprint index (insertion order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintHandle(pub(crate) u64);

impl FingerprintHandle {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FingerprintHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A stored fingerprint the input is a near-duplicate of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub handle: FingerprintHandle,

    /// Record the matched fingerprint belongs to
    pub record_id: Uuid,

    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_nan() {
        assert!(Fingerprint::new(vec![]).is_none());
        assert!(Fingerprint::new(vec![0.1, f32::NAN]).is_none());
        assert!(Fingerprint::new(vec![0.1, 0.2]).is_some());
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
