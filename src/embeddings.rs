//! Embedding providers.
//!
//! The ingestion pipeline and retriever both go through [`EmbeddingProvider`]
//! so tests can swap the serving backend for a deterministic mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::types::RagError;

/// Computes fixed-dimension vectors for batches of text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Name of the embedding model this provider serves.
    fn model(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Provider backed by an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &ProviderConfig, model: impl Into<String>) -> Result<Self, RagError> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: config.endpoint("v1/embeddings")?,
            api_key: config.api_key.clone(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?
            .error_for_status()
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "requested {} embeddings, backend returned {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Deterministic provider for tests and offline runs.
///
/// Vectors are seeded from a hash of the input text, so identical texts map
/// to identical embeddings across calls and processes.
pub struct MockEmbeddingProvider {
    model: String,
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "mock-embedder".to_string(),
            dimension,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn hash_to_vec(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        (0..self.dimension)
            .map(|i| {
                let bits = seed.rotate_left((i % 64) as u32) ^ ((i as u64) << 24);
                (bits as f32) / u32::MAX as f32
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.hash_to_vec(text)).collect())
    }
}
