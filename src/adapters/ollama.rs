//! HTTP embedding adapter for Ollama-compatible servers.
//!
//! Endpoint: POST {base_url}/api/embeddings
//! Body: { "model": ..., "prompt": ... } -> { "embedding": [...] }

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, CapabilityError, Embedder, DEFAULT_REQUEST_TIMEOUT};

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedder backed by an Ollama `/api/embeddings` endpoint
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl Default for HttpEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_URL, DEFAULT_EMBEDDING_MODEL)
    }
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Abandon requests that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        if !response.status().is_success() {
            return Err(CapabilityError::failed(
                self.name(),
                format!("HTTP {} from {}", response.status(), self.endpoint()),
            ));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        if body.embedding.is_empty() {
            return Err(CapabilityError::failed(self.name(), "empty embedding"));
        }

        Ok(body.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let embedder = HttpEmbedder::new("http://localhost:11434/", "nomic-embed-text");
        assert_eq!(embedder.endpoint(), "http://localhost:11434/api/embeddings");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_capability_error() {
        let embedder = HttpEmbedder::new("http://127.0.0.1:9", "m");
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, CapabilityError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_silent_server_hits_client_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let embedder = HttpEmbedder::new(format!("http://{}", addr), "m")
            .with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = embedder.embed("hello").await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, CapabilityError::Failed { .. }));
    }
}
