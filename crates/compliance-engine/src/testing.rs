//! In-memory collaborators for unit tests

use async_trait::async_trait;
use corpus_core::{CorpusError, RuleMatch, RuleSource};
use shared_types::{Rule, RuleCategory, RuleSeverity};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::ModelError;
use crate::llm::{ChatMessage, LanguageModel, ResponseFormat};

/// Replays canned completions in order; repeats the last one when exhausted
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(&[response])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User messages received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        messages: &[ChatMessage],
        _format: ResponseFormat,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n"));

        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Fails every call with the given status
pub struct FailingModel {
    pub status: u16,
}

#[async_trait]
impl LanguageModel for FailingModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[ChatMessage],
        _format: ResponseFormat,
    ) -> Result<String, ModelError> {
        Err(ModelError::Status {
            status: self.status,
            body: "upstream unavailable".to_string(),
        })
    }
}

/// Behaves like a client built without a usable configuration
pub struct UnconfiguredModel;

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[ChatMessage],
        _format: ResponseFormat,
    ) -> Result<String, ModelError> {
        Err(ModelError::Configuration("LLM_API_KEY is not set".to_string()))
    }
}

/// Returns the same matches for every query
pub struct StaticRules {
    matches: Vec<RuleMatch>,
    calls: AtomicUsize,
}

impl StaticRules {
    pub fn new(matches: Vec<RuleMatch>) -> Self {
        Self {
            matches,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleSource for StaticRules {
    async fn retrieve(
        &self,
        _text: &str,
        top_k: usize,
        _corpus: Option<&str>,
    ) -> Result<Vec<RuleMatch>, CorpusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

/// Fails every query with the given error
pub struct FailingRules {
    pub error: fn() -> CorpusError,
}

#[async_trait]
impl RuleSource for FailingRules {
    async fn retrieve(
        &self,
        _text: &str,
        _top_k: usize,
        _corpus: Option<&str>,
    ) -> Result<Vec<RuleMatch>, CorpusError> {
        Err((self.error)())
    }
}

pub fn rule_match(id: &str, title: &str, description: &str, score: f32) -> RuleMatch {
    RuleMatch {
        rule: Rule {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            category: RuleCategory::Disclosure,
            severity: RuleSeverity::Medium,
            source_document: None,
        },
        score,
        text: description.to_string(),
    }
}
