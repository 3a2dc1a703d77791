//! Rule search - retrieval of candidate rules for a passage of text
//!
//! This module provides:
//! - The [`RuleSource`] seam used by checkers that need reference rules
//! - [`RuleRetriever`], the embedding + vector index implementation
//! - Match quality classification of similarity scores

pub mod vector;

pub use vector::RuleRetriever;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::Rule;

use crate::error::CorpusError;

// Search confidence thresholds
pub const HIGH_CONFIDENCE_THRESHOLD: f32 = 0.85;
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.75;

/// Corpus queried when the caller does not name one
pub const DEFAULT_CORPUS: &str = "listing-rules";

/// A retrieved rule with its similarity to the query text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    pub rule: Rule,
    /// Similarity in `0.0..=1.0`
    pub score: f32,
    /// Original passage text from the index metadata
    pub text: String,
}

impl RuleMatch {
    pub fn match_type(&self) -> MatchType {
        MatchType::from(self.score)
    }
}

/// Type of match based on confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    DirectMatch,  // score >= 0.85
    SimilarMatch, // 0.75 <= score < 0.85
    WeakMatch,    // score < 0.75
}

impl From<f32> for MatchType {
    fn from(score: f32) -> Self {
        if score >= HIGH_CONFIDENCE_THRESHOLD {
            MatchType::DirectMatch
        } else if score >= LOW_CONFIDENCE_THRESHOLD {
            MatchType::SimilarMatch
        } else {
            MatchType::WeakMatch
        }
    }
}

/// Anything that can produce ranked rules for a piece of text.
///
/// Implementations return an empty list when no evidence is available and
/// reserve `Err` for failures the caller has to know about.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn retrieve(
        &self,
        text: &str,
        top_k: usize,
        corpus: Option<&str>,
    ) -> Result<Vec<RuleMatch>, CorpusError>;

    /// Whether the backing corpus is reachable
    async fn health_check(&self) -> Result<(), CorpusError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_thresholds() {
        assert_eq!(MatchType::from(0.9), MatchType::DirectMatch);
        assert_eq!(MatchType::from(0.85), MatchType::DirectMatch);
        assert_eq!(MatchType::from(0.8), MatchType::SimilarMatch);
        assert_eq!(MatchType::from(0.1), MatchType::WeakMatch);
    }
}
