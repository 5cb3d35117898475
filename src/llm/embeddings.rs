//! OpenAI-compatible embeddings client.
//!
//! Returns unit-L2-normalized vectors so downstream similarity is a plain
//! dot product.

use crate::config::EmbeddingConfig;
use crate::error::{RagJudgeError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-compatible embeddings client.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    /// Create a new embedding client with the given configuration.
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// The configured default embedding model.
    pub fn configured_model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }

    /// Embed a batch of texts with the given model.
    ///
    /// Output order matches input order regardless of the order the
    /// service reports results in.
    pub async fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model,
            input: texts,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if !self.config.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        let response = builder.json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RagJudgeError::LlmApi(format!(
                "Embedding request failed ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RagJudgeError::LlmParse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(RagJudgeError::LlmApi(format!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        Ok(data
            .into_iter()
            .map(|d| normalize_l2(d.embedding))
            .collect())
    }

    /// Embed a single text with the given model.
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(model, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagJudgeError::LlmApi("Empty embedding response".to_string()))
    }
}

/// Scale a vector to unit L2 norm. Zero vectors are returned unchanged.
pub fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_l2() {
        let v = normalize_l2(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let v = normalize_l2(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_endpoint_construction() {
        let config = EmbeddingConfig {
            api_base: "http://localhost:8080/".to_string(),
            api_key: String::new(),
            model: "test-embedder".to_string(),
        };
        let client = EmbeddingClient::new(config);
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/embeddings");
    }
}
