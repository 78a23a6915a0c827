//! HTTP zero-shot adapter for Hugging Face style inference servers.
//!
//! Request:  { "inputs": text, "parameters": { "candidate_labels": [...], "multi_label": true } }
//! Response: { "labels": [...], "scores": [...] }

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, CapabilityError, ZeroShotScorer, DEFAULT_REQUEST_TIMEOUT};

pub const DEFAULT_ZERO_SHOT_URL: &str =
    "http://localhost:8080/models/facebook/bart-large-mnli";

#[derive(Serialize)]
struct Parameters<'a> {
    candidate_labels: &'a [String],
    multi_label: bool,
}

#[derive(Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: Parameters<'a>,
}

#[derive(Debug, Deserialize)]
struct ZeroShotResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

pub struct HttpZeroShot {
    url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl HttpZeroShot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_token: None,
            client: http_client(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

/// Pair labels with scores, dropping labels the caller did not ask for
/// and non-finite scores.
fn pair_scores(response: ZeroShotResponse, asked: &[String]) -> HashMap<String, f64> {
    response
        .labels
        .into_iter()
        .zip(response.scores)
        .filter(|(label, score)| score.is_finite() && asked.contains(label))
        .collect()
}

#[async_trait]
impl ZeroShotScorer for HttpZeroShot {
    fn name(&self) -> &str {
        "zero_shot"
    }

    async fn classify(
        &self,
        text: &str,
        labels: &[String],
    ) -> Result<HashMap<String, f64>, CapabilityError> {
        if labels.is_empty() {
            return Ok(HashMap::new());
        }

        let mut request = self.client.post(&self.url).json(&ZeroShotRequest {
            inputs: text,
            parameters: Parameters {
                candidate_labels: labels,
                multi_label: true,
            },
        });

        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        if !response.status().is_success() {
            return Err(CapabilityError::failed(
                self.name(),
                format!("HTTP {}", response.status()),
            ));
        }

        let body: ZeroShotResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::failed(self.name(), e))?;

        if body.labels.len() != body.scores.len() {
            return Err(CapabilityError::failed(
                self.name(),
                format!(
                    "{} labels but {} scores",
                    body.labels.len(),
                    body.scores.len()
                ),
            ));
        }

        Ok(pair_scores(body, labels))
    }
}
