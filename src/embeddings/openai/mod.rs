
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::QaError;
use crate::config::{API_KEY_ENV, OpenAiEmbeddingConfig};
use crate::embeddings::TextEncoder;
use crate::net::{agent_with_timeout, request_with_retry};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Encoder backed by an OpenAI-compatible embeddings API
#[derive(Debug, Clone)]
pub struct OpenAiEncoder {
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: Option<u32>,
    batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEncoder {
    #[inline]
    pub fn new(config: &OpenAiEmbeddingConfig) -> Result<Self, QaError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                QaError::Config(format!(
                    "The openai embedding provider requires the {API_KEY_ENV} environment variable"
                ))
            })?;

        Ok(Self {
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size as usize,
            agent: agent_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn encode_batch_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embeddings request")?;

        let response_text = request_with_retry(self.retry_attempts, || {
            self.agent
                .post(&self.endpoint)
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to call embeddings API")?;

        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&response_text).context("Failed to parse embeddings response")?;

        if parsed.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Embeddings API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            ));
        }

        // The API may reorder entries; restore input order
        parsed.data.sort_by_key(|entry| entry.index);

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn encode_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Encoding {} texts via {}", texts.len(), self.endpoint);

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            let batch_results = self
                .encode_batch_request(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(batch_results);
        }

        Ok(results)
    }
}

impl TextEncoder for OpenAiEncoder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QaError> {
        self.encode_all(texts)
            .map_err(|e| QaError::Embedding(format!("{e:#}")))
    }
}
