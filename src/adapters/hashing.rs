//! Offline embedder based on feature hashing.
//!
//! Each lowercase word token (and each adjacent word pair) is hashed with
//! SHA-256 into one of `dimension` buckets with a signed weight. The
//! resulting vector is L2-normalised, so texts sharing vocabulary have a
//! high cosine similarity. Deterministic across runs and platforms.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{CapabilityError, Embedder};

pub const DEFAULT_DIMENSION: usize = 384;

/// Weight of a word-pair feature relative to a single word
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of `dimension` (at least 1)
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Synchronous embedding; the async trait method delegates here
    pub fn embed_sync(&self, text: &str) -> Option<Vec<f32>> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        if tokens.is_empty() {
            return None;
        }

        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }

        for pair in tokens.windows(2) {
            let (index, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[index] += sign * BIGRAM_WEIGHT;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Some(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        self.embed_sync(text)
            .ok_or_else(|| CapabilityError::failed(self.name(), "text has no word tokens"))
    }
}
