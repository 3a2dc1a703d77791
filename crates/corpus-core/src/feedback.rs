//! Feedback write path
//!
//! Reviewers can submit an improved rewrite of a passage. The pair is
//! embedded and written into a dedicated feedback corpus, kept apart from the
//! rule corpus: analysis retrieval never reads it, it is only visible to an
//! explicit search of that corpus. This is the only place the crate writes to
//! an external backend, and it is only wired up when the server runs in
//! training mode.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::error::CorpusError;
use crate::storage::{IndexRecord, VectorIndex, TEXT_KEY};

/// Metadata key holding the reviewer's improved text
pub const IMPROVED_TEXT_KEY: &str = "improvedText";

#[async_trait]
pub trait FeedbackWriter: Send + Sync {
    /// Store an (original, improved) pair; `false` when the write failed
    async fn upsert(&self, original: &str, improved: &str, metadata: Map<String, Value>) -> bool;
}

/// Writes feedback examples into the vector index
pub struct IndexFeedbackWriter {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    corpus: String,
}

impl IndexFeedbackWriter {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, corpus: &str) -> Self {
        Self {
            embedder,
            index,
            corpus: corpus.to_string(),
        }
    }

    async fn try_upsert(
        &self,
        original: &str,
        improved: &str,
        mut metadata: Map<String, Value>,
    ) -> Result<String, CorpusError> {
        if original.trim().is_empty() || improved.trim().is_empty() {
            return Err(CorpusError::InvalidResponse(
                "feedback requires both original and improved text".to_string(),
            ));
        }

        let values = self.embedder.embed(original).await?;
        let id = format!("feedback-{}", Uuid::new_v4());

        metadata.insert(TEXT_KEY.to_string(), Value::String(original.to_string()));
        metadata.insert(IMPROVED_TEXT_KEY.to_string(), Value::String(improved.to_string()));
        metadata
            .entry("kind".to_string())
            .or_insert_with(|| Value::String("feedback".to_string()));

        self.index
            .upsert(
                vec![IndexRecord {
                    id: id.clone(),
                    values,
                    metadata,
                }],
                &self.corpus,
            )
            .await?;
        Ok(id)
    }
}

#[async_trait]
impl FeedbackWriter for IndexFeedbackWriter {
    async fn upsert(&self, original: &str, improved: &str, metadata: Map<String, Value>) -> bool {
        match self.try_upsert(original, improved, metadata).await {
            Ok(id) => {
                info!("Stored feedback example {} in '{}'", id, self.corpus);
                true
            }
            Err(e) => {
                error!("Feedback upsert failed: {}", e);
                false
            }
        }
    }
}
