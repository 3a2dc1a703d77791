//! Corpus Core - rule retrieval for listing compliance review
//!
//! This crate provides:
//! - Embedding backends (remote HTTP and local hashing)
//! - Vector index backends (remote HTTP and in-memory)
//! - Rule retrieval and match classification
//! - Near-duplicate rule removal
//! - The feedback write path
//! - Configuration management

pub mod config;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod feedback;
pub mod search;
pub mod storage;

// Re-export commonly used types
pub use config::{parse_env, RetrievalConfig};
pub use dedup::{deduplicate, deduplicate_matches};
pub use embeddings::{Embedder, HashingEmbedder, HttpEmbedder};
pub use error::CorpusError;
pub use feedback::{FeedbackWriter, IndexFeedbackWriter};
pub use search::{MatchType, RuleMatch, RuleRetriever, RuleSource, DEFAULT_CORPUS};
pub use storage::{HttpVectorIndex, InMemoryIndex, IndexMatch, IndexRecord, VectorIndex};
