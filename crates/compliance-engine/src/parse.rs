//! Parse-or-fallback boundary for model output
//!
//! Models asked for JSON still wrap it in prose or code fences, or return
//! something that is not JSON at all. Every caller goes through
//! [`parse_or_fallback`], which logs unusable output once and hands the
//! error to the caller's fallback.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap();
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NotFound,

    #[error("invalid JSON in model output: {0}")]
    Invalid(String),
}

/// Locate the JSON object in a completion: the whole text, a fenced block,
/// or the span between the first `{` and the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    if let Some(block) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        return Some(block.as_str());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a typed value out of a model completion
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let block = extract_json_block(text).ok_or(ParseError::NotFound)?;
    serde_json::from_str(block).map_err(|e| ParseError::Invalid(e.to_string()))
}

/// Parse a typed value out of a completion and hand it to `parsed`. When
/// no usable value is found the error is logged under `context` and
/// `fallback` decides the outcome instead.
pub fn parse_or_fallback<T, R>(
    text: &str,
    context: &str,
    parsed: impl FnOnce(T) -> R,
    fallback: impl FnOnce(ParseError) -> R,
) -> R
where
    T: DeserializeOwned,
{
    match parse_model_json(text) {
        Ok(value) => parsed(value),
        Err(e) => {
            warn!("Unusable model output for {}: {}", context, e);
            fallback(e)
        }
    }
}
