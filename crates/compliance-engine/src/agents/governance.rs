// Corporate governance checks: board composition and committees
use async_trait::async_trait;

use super::{AgentRequest, AgentVerdict, SectionAgent, SectionKind};
use crate::error::EngineError;
use crate::patterns::{contains_any_stem, BOARD_KEYWORDS, COMMITTEE_KEYWORDS, DIRECTOR_KEYWORDS};

const AGENT: &str = "governance";

const BASE_SCORE: u32 = 90;
const INCOMPLETE_SCORE: u32 = 40;
const NO_COMMITTEE_PENALTY: u32 = 10;

pub const BOARD_COMPOSITION_SUGGESTION: &str =
    "Discuss the board composition, including the number of directors and their independence";
pub const COMMITTEE_SUGGESTION: &str =
    "Consider describing the board committees (audit, remuneration, nomination) and their mandates";

#[derive(Debug, Default, Clone, Copy)]
pub struct GovernanceAgent;

impl GovernanceAgent {
    pub fn check(&self, request: &AgentRequest) -> AgentVerdict {
        if !SectionKind::Governance.accepts(request) {
            return AgentVerdict::misrouted(AGENT, &request.title);
        }

        let content = &request.content;
        let mentions_board = contains_any_stem(content, BOARD_KEYWORDS);
        let mentions_directors = contains_any_stem(content, DIRECTOR_KEYWORDS);
        let mentions_committees = contains_any_stem(content, COMMITTEE_KEYWORDS);

        if !(mentions_board && mentions_directors) {
            let mut verdict =
                AgentVerdict::non_compliant(AGENT, INCOMPLETE_SCORE, vec![BOARD_COMPOSITION_SUGGESTION.to_string()]);
            if !mentions_committees {
                verdict = verdict.with_suggestion(COMMITTEE_SUGGESTION);
            }
            return verdict;
        }

        if !mentions_committees {
            let mut verdict = AgentVerdict::compliant(AGENT, BASE_SCORE - NO_COMMITTEE_PENALTY);
            verdict.suggestions.push(COMMITTEE_SUGGESTION.to_string());
            return verdict;
        }

        AgentVerdict::compliant(AGENT, BASE_SCORE)
    }
}

#[async_trait]
impl SectionAgent for GovernanceAgent {
    fn name(&self) -> &'static str {
        AGENT
    }

    async fn analyze(&self, request: &AgentRequest) -> Result<AgentVerdict, EngineError> {
        Ok(self.check(request))
    }
}
