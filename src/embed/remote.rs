//! Remote hosted-API embedding provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

use super::EmbeddingProvider;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Calls an OpenAI-compatible embeddings endpoint.
pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl RemoteEmbeddingProvider {
    pub fn new(base_url: String, api_key: String, model: String, dim: usize, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ProviderUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            dim,
        })
    }

    async fn call(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| EmbeddingError::GenerationFailed(e.to_string()))?;

        let parsed: EmbeddingResponse = response.json().await?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dim]);
        }
        let mut result = self.call(vec![text]).await?;
        result.pop().ok_or_else(|| {
            EmbeddingError::GenerationFailed("empty response from embedding API".to_string()).into()
        })
    }

    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            let non_empty: Vec<&str> = batch
                .iter()
                .map(|s| s.as_str())
                .filter(|s| !s.trim().is_empty())
                .collect();

            let fetched = if non_empty.is_empty() {
                Vec::new()
            } else {
                self.call(non_empty).await?
            };
            let mut embeddings = fetched.into_iter();

            for text in batch {
                if text.trim().is_empty() {
                    out.push(vec![0.0; self.dim]);
                } else {
                    out.push(embeddings.next().ok_or_else(|| {
                        EmbeddingError::GenerationFailed(
                            "embedding response shorter than request".to_string(),
                        )
                    })?);
                }
            }
        }
        Ok(out)
    }
}
