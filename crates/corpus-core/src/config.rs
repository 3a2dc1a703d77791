//! Configuration management for rule retrieval
//!
//! Selects the embedding and vector index backends and builds the retriever.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::embeddings::{Embedder, HashingEmbedder, HttpEmbedder, EMBEDDING_DIM, HASHING_DIM};
use crate::feedback::IndexFeedbackWriter;
use crate::search::{RuleRetriever, DEFAULT_CORPUS};
use crate::storage::{HttpVectorIndex, InMemoryIndex, VectorIndex};

/// Default number of rules retrieved per subsection
pub const DEFAULT_TOP_K: usize = 5;

/// Backend provider options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendProvider {
    /// Remote embedding service plus remote vector index
    Remote,
    /// Hashing embedder plus in-memory index (for development)
    Local,
}

/// Retrieval configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub provider: BackendProvider,
    /// Embeddings route, e.g. `https://api.openai.com/v1/embeddings`
    pub embedding_url: Option<String>,
    pub embedding_model: String,
    pub embedding_dim: usize,
    /// Index host, e.g. `https://rules-abc.svc.pinecone.io`
    pub index_url: Option<String>,
    pub embedding_api_key: Option<String>,
    pub index_api_key: Option<String>,
    /// Corpus (namespace) queried when none is given
    pub corpus: String,
    /// Corpus receiving feedback examples
    pub feedback_corpus: String,
    pub top_k: usize,
    pub timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::local()
    }
}

impl RetrievalConfig {
    /// Configuration for local development: no network backends
    pub fn local() -> Self {
        Self {
            provider: BackendProvider::Local,
            embedding_url: None,
            embedding_model: String::new(),
            embedding_dim: HASHING_DIM,
            index_url: None,
            embedding_api_key: None,
            index_api_key: None,
            corpus: DEFAULT_CORPUS.to_string(),
            feedback_corpus: format!("{}-feedback", DEFAULT_CORPUS),
            top_k: DEFAULT_TOP_K,
            timeout: Duration::from_secs(10),
        }
    }

    /// Configuration for remote embedding and index services
    pub fn remote(embedding_url: &str, index_url: &str) -> Self {
        Self {
            provider: BackendProvider::Remote,
            embedding_url: Some(embedding_url.to_string()),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: EMBEDDING_DIM,
            index_url: Some(index_url.to_string()),
            ..Self::local()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - RETRIEVAL_PROVIDER: "remote" or "local" (default: "local")
    /// - EMBEDDING_API_URL / EMBEDDING_MODEL / EMBEDDING_DIM
    /// - EMBEDDING_API_KEY (falls back to OPENAI_API_KEY)
    /// - VECTOR_INDEX_URL / VECTOR_INDEX_API_KEY
    /// - RULE_CORPUS: corpus name (default: "listing-rules")
    /// - FEEDBACK_CORPUS: corpus for feedback examples
    /// - RULE_TOP_K: rules per subsection (default: 5)
    /// - RETRIEVAL_TIMEOUT_MS: per-request timeout (default: 10000)
    pub fn from_env() -> Result<Self> {
        let provider_str =
            std::env::var("RETRIEVAL_PROVIDER").unwrap_or_else(|_| "local".to_string());

        let provider = match provider_str.to_lowercase().as_str() {
            "remote" => BackendProvider::Remote,
            "local" => BackendProvider::Local,
            _ => return Err(anyhow!("Unknown retrieval provider: {}", provider_str)),
        };

        let defaults = match provider {
            BackendProvider::Remote => Self {
                provider: BackendProvider::Remote,
                embedding_model: "text-embedding-3-small".to_string(),
                embedding_dim: EMBEDDING_DIM,
                ..Self::local()
            },
            BackendProvider::Local => Self::local(),
        };

        let corpus = std::env::var("RULE_CORPUS").unwrap_or(defaults.corpus);
        let feedback_corpus =
            std::env::var("FEEDBACK_CORPUS").unwrap_or_else(|_| format!("{}-feedback", corpus));

        Ok(Self {
            embedding_url: std::env::var("EMBEDDING_API_URL").ok(),
            embedding_model: std::env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dim: parse_env("EMBEDDING_DIM")?.unwrap_or(defaults.embedding_dim),
            index_url: std::env::var("VECTOR_INDEX_URL").ok(),
            embedding_api_key: std::env::var("EMBEDDING_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok(),
            index_api_key: std::env::var("VECTOR_INDEX_API_KEY").ok(),
            top_k: parse_env("RULE_TOP_K")?.unwrap_or(defaults.top_k),
            timeout: parse_env("RETRIEVAL_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            corpus,
            feedback_corpus,
            provider,
        })
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        match self.provider {
            BackendProvider::Remote => {
                let url = self
                    .embedding_url
                    .as_ref()
                    .ok_or_else(|| anyhow!("EMBEDDING_API_URL required for remote retrieval"))?;
                let embedder =
                    HttpEmbedder::new(url, &self.embedding_model, self.embedding_dim, self.timeout)?
                        .with_api_key(self.embedding_api_key.clone());
                Ok(Arc::new(embedder))
            }
            BackendProvider::Local => Ok(Arc::new(HashingEmbedder::new(self.embedding_dim))),
        }
    }

    pub fn build_index(&self) -> Result<Arc<dyn VectorIndex>> {
        match self.provider {
            BackendProvider::Remote => {
                let url = self
                    .index_url
                    .as_ref()
                    .ok_or_else(|| anyhow!("VECTOR_INDEX_URL required for remote retrieval"))?;
                let index = HttpVectorIndex::new(url, self.timeout)?
                    .with_api_key(self.index_api_key.clone());
                Ok(Arc::new(index))
            }
            BackendProvider::Local => Ok(Arc::new(InMemoryIndex::new())),
        }
    }

    /// Build the retriever and feedback writer sharing one set of backends
    pub fn build(&self) -> Result<(Arc<RuleRetriever>, Arc<IndexFeedbackWriter>)> {
        let embedder = self.build_embedder()?;
        let index = self.build_index()?;

        let retriever = RuleRetriever::new(Arc::clone(&embedder), Arc::clone(&index))
            .with_default_corpus(&self.corpus);
        let feedback = IndexFeedbackWriter::new(embedder, index, &self.feedback_corpus);

        Ok((Arc::new(retriever), Arc::new(feedback)))
    }
}

/// Read and parse an optional environment variable. Unset is `None`; a value
/// that does not parse is an error naming the variable.
pub fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env() {
        std::env::set_var("CORPUS_CORE_TEST_TOP_K", " 12 ");
        std::env::set_var("CORPUS_CORE_TEST_BAD_TOP_K", "twelve");

        assert_eq!(parse_env::<usize>("CORPUS_CORE_TEST_TOP_K").unwrap(), Some(12));
        assert_eq!(parse_env::<usize>("CORPUS_CORE_TEST_UNSET").unwrap(), None);
        let err = parse_env::<usize>("CORPUS_CORE_TEST_BAD_TOP_K").unwrap_err();
        assert!(err.to_string().contains("CORPUS_CORE_TEST_BAD_TOP_K"));
    }

    #[test]
    fn test_local_config() {
        let config = RetrievalConfig::local();
        assert_eq!(config.provider, BackendProvider::Local);
        assert_eq!(config.corpus, "listing-rules");
        assert_eq!(config.feedback_corpus, "listing-rules-feedback");
        assert_eq!(config.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn test_remote_config() {
        let config = RetrievalConfig::remote("http://embed", "http://index");
        assert_eq!(config.provider, BackendProvider::Remote);
        assert_eq!(config.embedding_dim, EMBEDDING_DIM);
        assert_eq!(config.index_url.as_deref(), Some("http://index"));
    }

    #[test]
    fn test_remote_without_urls_fails_to_build() {
        let config = RetrievalConfig {
            provider: BackendProvider::Remote,
            ..RetrievalConfig::local()
        };
        assert!(config.build_embedder().is_err());
        assert!(config.build_index().is_err());
    }

    #[test]
    fn test_local_build_succeeds() {
        let config = RetrievalConfig::local();
        let (retriever, _feedback) = config.build().unwrap();
        assert_eq!(retriever.default_corpus(), "listing-rules");
    }
}
