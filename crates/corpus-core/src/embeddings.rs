//! Embedding backends
//!
//! Text is turned into fixed-length vectors by an external embedding service.
//! Two implementations are provided:
//!
//! - [`HttpEmbedder`]: calls an OpenAI-compatible `/embeddings` endpoint
//! - [`HashingEmbedder`]: deterministic feature hashing, used for local
//!   development and tests when no embedding service is configured

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::error::CorpusError;

/// Default embedding dimension (text-embedding-3-small and friends)
pub const EMBEDDING_DIM: usize = 1536;

/// Dimension used by the local hashing embedder
pub const HASHING_DIM: usize = 256;

/// Converts text into a fixed-length float vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CorpusError>;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embedding endpoint
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbedder {
    /// # Arguments
    ///
    /// * `endpoint` - Full URL of the embeddings route
    /// * `model` - Model name sent with every request
    /// * `dimension` - Expected vector length; responses of another length are rejected
    pub fn new(
        endpoint: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, CorpusError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CorpusError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: None,
            dimension,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CorpusError> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: EmbeddingResponse = response.json().await?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CorpusError::InvalidResponse("empty embedding data".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(CorpusError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        debug!("Embedded {} chars into {} dims", text.len(), embedding.len());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Vectors are L2-normalised so cosine similarity reduces to a dot product.
/// Texts sharing many words end up close together, which is enough for
/// development corpora and tests.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let bucket = (word_hash(&word) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIM)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CorpusError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Bucket hash for one word.
///
/// Vectors written to an index and the query vectors compared against them
/// must agree on every bucket, including across builds and toolchains, so
/// this uses SHA-256 rather than `std`'s unspecified hasher.
fn word_hash(word: &str) -> u64 {
    let digest = Sha256::digest(word.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_sync("Board of directors composition");
        let b = embedder.embed_sync("Board of directors composition");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASHING_DIM);
    }

    #[test]
    fn test_word_hash_is_sha256_prefix() {
        let digest = Sha256::digest(b"board");
        assert_eq!(&word_hash("board").to_be_bytes()[..], &digest[..8]);
        assert_ne!(word_hash("board"), word_hash("director"));
    }

    #[test]
    fn test_hashing_embedder_normalises() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed_sync("revenue revenue profit");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_yields_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_sync("   ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_case_insensitive() {
        let embedder = HashingEmbedder::default();
        assert_eq!(embedder.embed_sync("Revenue"), embedder.embed_sync("revenue"));
    }
}
