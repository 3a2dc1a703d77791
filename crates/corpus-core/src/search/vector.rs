//! Vector retrieval of rules using semantic embeddings
//!
//! The retrieval pipeline:
//! 1. Check that we are running inside the server runtime
//! 2. Generate the query embedding through the [`Embedder`]
//! 3. Run a nearest-neighbour query against the named corpus
//! 4. Convert index metadata into [`Rule`]s, clamp scores, rank descending
//!
//! Backend outages and empty corpora are not errors here: they produce an
//! empty list so that analysis continues without evidence. Only
//! configuration problems are returned as `Err`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared_types::{Rule, RuleCategory, RuleSeverity};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::error::CorpusError;
use crate::search::{RuleMatch, RuleSource, DEFAULT_CORPUS};
use crate::storage::{IndexMatch, VectorIndex, TEXT_KEY};

/// Maximum title length derived from passage text when metadata has none
const DERIVED_TITLE_CHARS: usize = 80;

/// Retrieves candidate rules for a passage of text
pub struct RuleRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    default_corpus: String,
}

impl RuleRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            default_corpus: DEFAULT_CORPUS.to_string(),
        }
    }

    pub fn with_default_corpus(mut self, corpus: &str) -> Self {
        self.default_corpus = corpus.to_string();
        self
    }

    pub fn default_corpus(&self) -> &str {
        &self.default_corpus
    }

    /// Retrieve up to `top_k` rules most similar to `text`.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::Configuration`] when called outside a Tokio
    /// runtime or when a backend reports a configuration problem. Every other
    /// backend failure degrades to `Ok(vec![])`.
    pub async fn retrieve(
        &self,
        text: &str,
        top_k: usize,
        corpus: Option<&str>,
    ) -> Result<Vec<RuleMatch>, CorpusError> {
        ensure_server_context()?;

        let corpus = corpus.unwrap_or(&self.default_corpus);
        if text.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = match self.embedder.embed(text).await {
            Ok(embedding) => embedding,
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!("Embedding failed, continuing without evidence: {}", e);
                return Ok(Vec::new());
            }
        };

        let matches = match self.index.query(&embedding, top_k, corpus).await {
            Ok(matches) => matches,
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!("Rule index query on '{}' failed, continuing without evidence: {}", corpus, e);
                return Ok(Vec::new());
            }
        };

        let mut results: Vec<RuleMatch> = matches.into_iter().filter_map(to_rule_match).collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        if results.is_empty() {
            warn!("Corpus '{}' returned no usable rules", corpus);
        } else {
            debug!("Retrieved {} rules from '{}'", results.len(), corpus);
        }
        Ok(results)
    }
}

#[async_trait]
impl RuleSource for RuleRetriever {
    async fn retrieve(
        &self,
        text: &str,
        top_k: usize,
        corpus: Option<&str>,
    ) -> Result<Vec<RuleMatch>, CorpusError> {
        RuleRetriever::retrieve(self, text, top_k, corpus).await
    }

    async fn health_check(&self) -> Result<(), CorpusError> {
        self.index.health_check().await
    }
}

/// Network calls are only allowed from inside the server runtime
fn ensure_server_context() -> Result<(), CorpusError> {
    tokio::runtime::Handle::try_current().map(|_| ()).map_err(|_| {
        CorpusError::Configuration(
            "rule retrieval must run inside the server runtime".to_string(),
        )
    })
}

/// Convert an index hit into a rule; hits without passage text are dropped
fn to_rule_match(hit: IndexMatch) -> Option<RuleMatch> {
    let text = string_field(&hit.metadata, TEXT_KEY)?;
    if text.trim().is_empty() {
        return None;
    }

    let title = string_field(&hit.metadata, "title")
        .unwrap_or_else(|| text.chars().take(DERIVED_TITLE_CHARS).collect());
    let description = string_field(&hit.metadata, "description").unwrap_or_else(|| text.clone());
    let category = string_field(&hit.metadata, "category")
        .map(|c| RuleCategory::parse(&c))
        .unwrap_or(RuleCategory::General);
    let severity = string_field(&hit.metadata, "severity")
        .map(|s| RuleSeverity::parse(&s))
        .unwrap_or(RuleSeverity::Medium);
    let source_document = string_field(&hit.metadata, "source");

    let score = if hit.score.is_finite() {
        hit.score.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(RuleMatch {
        rule: Rule {
            id: hit.id,
            title,
            description,
            category,
            severity,
            source_document,
        },
        score,
        text,
    })
}

fn string_field(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata.get(key).and_then(Value::as_str).map(str::to_string)
}
