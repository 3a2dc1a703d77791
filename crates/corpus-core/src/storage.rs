//! Vector index backends for the rule corpus
//!
//! The index is an external nearest-neighbour service. [`HttpVectorIndex`]
//! speaks a Pinecone-style JSON protocol (`/query`, `/vectors/upsert`) with
//! the corpus name sent as the namespace. [`InMemoryIndex`] keeps records in
//! process and is used for development and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::CorpusError;

/// Metadata key carrying the original passage text
pub const TEXT_KEY: &str = "text";

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A vector to be written into the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` matches from `corpus`, most similar first
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        corpus: &str,
    ) -> Result<Vec<IndexMatch>, CorpusError>;

    async fn upsert(&self, records: Vec<IndexRecord>, corpus: &str) -> Result<(), CorpusError>;

    async fn health_check(&self) -> Result<(), CorpusError> {
        Ok(())
    }
}

// ============================================================================
// Remote index
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
    namespace: &'a str,
}

/// Client for a Pinecone-style index host
pub struct HttpVectorIndex {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
}

impl HttpVectorIndex {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, CorpusError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CorpusError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.host, path));
        match &self.api_key {
            Some(key) => request.header("Api-Key", key),
            None => request,
        }
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        corpus: &str,
    ) -> Result<Vec<IndexMatch>, CorpusError> {
        let response = self
            .post("/query")
            .json(&QueryRequest {
                vector,
                top_k,
                namespace: corpus,
                include_metadata: true,
            })
            .send()
            .await?
            .error_for_status()?;

        let body: QueryResponse = response.json().await?;
        debug!("Index query on '{}' returned {} matches", corpus, body.matches.len());
        Ok(body.matches)
    }

    async fn upsert(&self, records: Vec<IndexRecord>, corpus: &str) -> Result<(), CorpusError> {
        self.post("/vectors/upsert")
            .json(&UpsertRequest {
                vectors: &records,
                namespace: corpus,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), CorpusError> {
        self.post("/describe_index_stats")
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ============================================================================
// In-process index
// ============================================================================

/// Brute-force cosine-similarity index held in memory
#[derive(Default)]
pub struct InMemoryIndex {
    corpora: RwLock<HashMap<String, Vec<IndexRecord>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, corpus: &str) -> usize {
        self.corpora
            .read()
            .await
            .get(corpus)
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        corpus: &str,
    ) -> Result<Vec<IndexMatch>, CorpusError> {
        let corpora = self.corpora.read().await;
        let Some(records) = corpora.get(corpus) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<IndexMatch> = records
            .iter()
            .map(|record| IndexMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn upsert(&self, records: Vec<IndexRecord>, corpus: &str) -> Result<(), CorpusError> {
        let mut corpora = self.corpora.write().await;
        let existing = corpora.entry(corpus.to_string()).or_default();

        for record in records {
            match existing.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record,
                None => existing.push(record),
            }
        }
        Ok(())
    }
}

/// Cosine similarity; zero when either vector is empty, zero-norm, or the
/// lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, values: Vec<f32>) -> IndexRecord {
        let mut metadata = Map::new();
        metadata.insert(TEXT_KEY.to_string(), Value::String(format!("text of {}", id)));
        IndexRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_in_memory_query_orders_by_score() {
        let index = InMemoryIndex::new();
        index
            .upsert(
                vec![
                    record("far", vec![0.0, 1.0]),
                    record("near", vec![1.0, 0.1]),
                    record("exact", vec![1.0, 0.0]),
                ],
                "rules",
            )
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 2, "rules").await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "exact");
        assert_eq!(matches[1].id, "near");
        assert!(matches[0].metadata.contains_key(TEXT_KEY));
    }

    #[tokio::test]
    async fn test_in_memory_unknown_corpus_is_empty() {
        let index = InMemoryIndex::new();
        assert!(index.query(&[1.0], 5, "missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_id() {
        let index = InMemoryIndex::new();
        index.upsert(vec![record("a", vec![1.0, 0.0])], "rules").await.unwrap();
        index.upsert(vec![record("a", vec![0.0, 1.0])], "rules").await.unwrap();
        assert_eq!(index.len("rules").await, 1);
        let matches = index.query(&[0.0, 1.0], 1, "rules").await.unwrap();
        assert!((matches[0].score - 1.0).abs() < 1e-6);
    }
}
