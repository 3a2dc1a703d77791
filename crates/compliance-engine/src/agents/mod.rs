//! Section checkers and keyword routing
//!
//! Every subsection is classified once into a [`SectionKind`]; the kind is
//! bound to a concrete [`SectionAgent`] in an [`AgentSet`]. Rule-based
//! checkers (risk, financial, governance) are pure text inspections. The
//! general checker retrieves reference rules and asks the language model.

pub mod financial;
pub mod general;
pub mod governance;
pub mod risk;

pub use financial::FinancialAgent;
pub use general::{GeneralAgent, StructuralRole};
pub use governance::GovernanceAgent;
pub use risk::RiskAgent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{Section, Subsection, SubsectionVerdict, VerdictMetadata};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RiskPolicy;
use crate::error::EngineError;
use crate::patterns::{
    contains_any_stem, FINANCIAL_TITLE_KEYWORDS, GOVERNANCE_TITLE_KEYWORDS, RISK_TITLE_KEYWORDS,
};

/// Input handed to a checker for one subsection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub subsection_id: String,
    pub title: String,
    pub section_title: String,
    pub content: String,
    /// Title -> content of the other subsections in the same section
    pub siblings: BTreeMap<String, String>,
}

impl AgentRequest {
    /// Build a request for `subsection`, with its siblings as cross-reference
    /// context. The subsection itself is never part of its own context.
    pub fn from_subsection(section: &Section, subsection: &Subsection) -> Self {
        let siblings = section
            .subsections
            .iter()
            .filter(|s| s.id != subsection.id)
            .map(|s| (s.title.clone(), s.content.clone()))
            .collect();

        Self {
            subsection_id: subsection.id.clone(),
            title: subsection.title.clone(),
            section_title: section.title.clone(),
            content: subsection.content.clone(),
            siblings,
        }
    }
}

/// Checker output before it is bound to a subsection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVerdict {
    pub is_compliant: bool,
    /// Clamped to 100 when converted into a [`SubsectionVerdict`]
    pub score: u32,
    pub suggestions: Vec<String>,
    pub metadata: VerdictMetadata,
}

impl AgentVerdict {
    pub fn compliant(agent: &str, score: u32) -> Self {
        Self {
            is_compliant: true,
            score,
            suggestions: Vec::new(),
            metadata: agent_metadata(agent),
        }
    }

    pub fn non_compliant(agent: &str, score: u32, suggestions: Vec<String>) -> Self {
        Self {
            is_compliant: false,
            score,
            suggestions,
            metadata: agent_metadata(agent),
        }
    }

    /// Verdict for a checker whose title precondition does not hold
    pub fn misrouted(agent: &str, title: &str) -> Self {
        Self::non_compliant(
            agent,
            0,
            vec![format!(
                "Section \"{}\" was routed to the {} checker but is not a {} section",
                title, agent, agent
            )],
        )
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn into_verdict(self, subsection: &Subsection) -> SubsectionVerdict {
        SubsectionVerdict::new(subsection, self.is_compliant, self.score, self.suggestions)
            .with_metadata(self.metadata)
    }
}

fn agent_metadata(agent: &str) -> VerdictMetadata {
    VerdictMetadata {
        agent: Some(agent.to_string()),
        ..VerdictMetadata::default()
    }
}

#[async_trait]
pub trait SectionAgent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, request: &AgentRequest) -> Result<AgentVerdict, EngineError>;
}

/// Fixed set of subsection kinds a checker can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Risk,
    Financial,
    Governance,
    General,
}

impl SectionKind {
    /// Classify by the subsection title, then the section title. Within a
    /// title the kinds are tried in risk, financial, governance order.
    pub fn classify(section_title: &str, subsection_title: &str) -> Self {
        [subsection_title, section_title]
            .iter()
            .find_map(|title| Self::from_title(title))
            .unwrap_or(SectionKind::General)
    }

    fn from_title(title: &str) -> Option<Self> {
        [SectionKind::Risk, SectionKind::Financial, SectionKind::Governance]
            .into_iter()
            .find(|kind| kind.matches_title(title))
    }

    /// Whether `title` carries one of this kind's keywords. `General`
    /// accepts every title.
    pub fn matches_title(self, title: &str) -> bool {
        match self {
            SectionKind::Risk => contains_any_stem(title, RISK_TITLE_KEYWORDS),
            SectionKind::Financial => contains_any_stem(title, FINANCIAL_TITLE_KEYWORDS),
            SectionKind::Governance => contains_any_stem(title, GOVERNANCE_TITLE_KEYWORDS),
            SectionKind::General => true,
        }
    }

    /// Precondition shared by the keyword checkers
    pub fn accepts(self, request: &AgentRequest) -> bool {
        self.matches_title(&request.title) || self.matches_title(&request.section_title)
    }
}

/// One checker per [`SectionKind`]
#[derive(Clone)]
pub struct AgentSet {
    risk: Arc<dyn SectionAgent>,
    financial: Arc<dyn SectionAgent>,
    governance: Arc<dyn SectionAgent>,
    general: Arc<dyn SectionAgent>,
}

impl AgentSet {
    /// Rule-based checkers for the keyword kinds, `general` for the rest
    pub fn new(general: Arc<dyn SectionAgent>, risk_policy: RiskPolicy) -> Self {
        Self {
            risk: Arc::new(RiskAgent::new(risk_policy)),
            financial: Arc::new(FinancialAgent),
            governance: Arc::new(GovernanceAgent),
            general,
        }
    }

    /// Replace the checker bound to `kind`
    pub fn with_agent(mut self, kind: SectionKind, agent: Arc<dyn SectionAgent>) -> Self {
        match kind {
            SectionKind::Risk => self.risk = agent,
            SectionKind::Financial => self.financial = agent,
            SectionKind::Governance => self.governance = agent,
            SectionKind::General => self.general = agent,
        }
        self
    }

    pub fn agent_for(&self, kind: SectionKind) -> &Arc<dyn SectionAgent> {
        match kind {
            SectionKind::Risk => &self.risk,
            SectionKind::Financial => &self.financial,
            SectionKind::Governance => &self.governance,
            SectionKind::General => &self.general,
        }
    }
}

#[cfg(test)]
pub(crate) fn request(section_title: &str, title: &str, content: &str) -> AgentRequest {
    AgentRequest {
        subsection_id: "sub-1".to_string(),
        title: title.to_string(),
        section_title: section_title.to_string(),
        content: content.to_string(),
        siblings: BTreeMap::new(),
    }
}
