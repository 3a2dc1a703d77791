// Stage implementations and their fallbacks
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;

use super::quality::enforce_brevity;
use super::{
    Assessment, ChainState, ComplianceStatus, ContentLength, ContextSummary, FinalVerdict, RelevantRule,
    RuleJudgment, Stage, StageError, SubsectionContext,
};
use crate::llm::{ChatMessage, LanguageModel, ResponseFormat};
use crate::parse::{parse_or_fallback, ParseError};

/// Rules scored below this by the filtering stage are dropped
const RELEVANCE_FLOOR: f64 = 50.0;
const MAX_SUGGESTIONS: usize = 3;
const MAX_FINAL_POINTS: usize = 2;

const SYSTEM_PROMPT: &str = "You are one stage of a listing compliance review. Answer only with \
the JSON object described in the instructions. Be specific to the subsection under review.";

pub(super) async fn run_stage(
    model: &dyn LanguageModel,
    stage: Stage,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    match stage {
        Stage::ContextExtraction => context_extraction(model, ctx, state).await,
        Stage::RuleFiltering => rule_filtering(model, ctx, state).await,
        Stage::TargetedSummarization => targeted_summarization(model, ctx, state).await,
        Stage::FeedbackIntegration => feedback_integration(model, ctx, state).await,
        Stage::QualityAssurance => quality_assurance(model, ctx, state).await,
        Stage::ContextualRelevance => contextual_relevance(model, ctx, state).await,
        Stage::IterativeRefinement => iterative_refinement(model, ctx, state).await,
    }
}

pub(super) fn apply_fallback(stage: Stage, ctx: &SubsectionContext, state: &mut ChainState) {
    match stage {
        Stage::ContextExtraction => {
            state.context = Some(ContextSummary {
                purpose: format!("Disclosure on {}", ctx.title),
                key_requirements: Vec::new(),
                length: ContentLength::of(&ctx.content),
            });
        }
        Stage::RuleFiltering => {
            state.relevant_rules = ctx
                .rules
                .iter()
                .map(|m| RelevantRule {
                    rule_id: m.rule.id.clone(),
                    relevance: (m.score.clamp(0.0, 1.0) * 100.0).round() as u8,
                    justification: "Retained without filtering".to_string(),
                })
                .collect();
        }
        Stage::TargetedSummarization => {
            state.judgments.clear();
            state.assessment = Some(Assessment::unavailable());
        }
        Stage::FeedbackIntegration | Stage::ContextualRelevance => {
            state.assessment = Some(state.assessment().conservative());
        }
        Stage::QualityAssurance => {
            let mut assessment = state.assessment().conservative();
            assessment.key_points = enforce_brevity(assessment.key_points);
            assessment.suggestions = enforce_brevity(assessment.suggestions);
            state.assessment = Some(assessment);
        }
        Stage::IterativeRefinement => {
            state.final_verdict = Some(fallback_verdict(ctx, &state.assessment()));
        }
    }
}

/// Final verdict derived from the working assessment alone
pub(super) fn fallback_verdict(ctx: &SubsectionContext, assessment: &Assessment) -> FinalVerdict {
    let compliance = assessment.compliance.conservative();
    let key_points = bounded_key_points(assessment.key_points.clone(), compliance);
    FinalVerdict {
        verdict: format!(
            "\"{}\" is {}. {}",
            ctx.title,
            describe(compliance),
            key_points[0]
        ),
        compliance,
        key_points,
        explanation: "Final refinement was unavailable; the verdict is derived from the intermediate assessment"
            .to_string(),
    }
}

fn describe(status: ComplianceStatus) -> &'static str {
    match status {
        ComplianceStatus::Compliant => "compliant with the applicable listing rules",
        ComplianceStatus::PartiallyCompliant => "partially compliant with the applicable listing rules",
        ComplianceStatus::NonCompliant => "not compliant with the applicable listing rules",
    }
}

/// One or two concrete points; never empty
fn bounded_key_points(points: Vec<String>, compliance: ComplianceStatus) -> Vec<String> {
    let mut points = enforce_brevity(points);
    points.truncate(MAX_FINAL_POINTS);
    if points.is_empty() {
        points.push(
            match compliance {
                ComplianceStatus::Compliant => "No material gaps were identified",
                ComplianceStatus::PartiallyCompliant => "Some requirements could not be confirmed",
                ComplianceStatus::NonCompliant => "Required disclosures are missing",
            }
            .to_string(),
        );
    }
    points
}

async fn ask<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    stage: Stage,
    ctx: &SubsectionContext,
    state: &ChainState,
    instructions: &str,
) -> Result<T, StageError> {
    let position = Stage::ALL.iter().position(|s| *s == stage).map_or(0, |i| i + 1);
    let prior = serde_json::to_string_pretty(state).unwrap_or_default();
    let prompt = format!(
        "Stage {}/{}: {}\n\n{}\n\nSection: {}\nSubsection: {}\nContent:\n{}\n\nPrior stage outputs:\n{}",
        position,
        Stage::ALL.len(),
        stage.name(),
        instructions,
        ctx.section_title,
        ctx.title,
        ctx.content,
        prior
    );

    let raw = model
        .complete(SYSTEM_PROMPT, &[ChatMessage::user(prompt)], ResponseFormat::Json)
        .await?;
    parse_or_fallback(&raw, stage.name(), Ok, |e| Err(StageError::Parse(e)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextResponse {
    purpose: String,
    #[serde(default)]
    key_requirements: Vec<String>,
}

async fn context_extraction(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    let response: ContextResponse = ask(
        model,
        Stage::ContextExtraction,
        ctx,
        state,
        "Describe the purpose of this subsection and list the key requirements it actually \
         addresses. Reply as {\"purpose\": string, \"keyRequirements\": [string]}.",
    )
    .await?;

    state.context = Some(ContextSummary {
        purpose: response.purpose.trim().to_string(),
        key_requirements: response
            .key_requirements
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        length: ContentLength::of(&ctx.content),
    });
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelevantRule {
    rule_id: String,
    relevance: f64,
    #[serde(default)]
    justification: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterResponse {
    #[serde(default)]
    relevant_rules: Vec<RawRelevantRule>,
}

async fn rule_filtering(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    if ctx.rules.is_empty() {
        state.relevant_rules.clear();
        return Ok(());
    }

    let catalogue: String = ctx
        .rules
        .iter()
        .map(|m| format!("- {}: {}. {}\n", m.rule.id, m.rule.title, m.rule.description))
        .collect();
    let instructions = format!(
        "Select only the rules below that directly apply to this subsection. Score each 0-100 \
         and justify it in one sentence. Reply as {{\"relevantRules\": [{{\"ruleId\": string, \
         \"relevance\": number, \"justification\": string}}]}}.\n\nCandidate rules:\n{}",
        catalogue
    );
    let response: FilterResponse = ask(model, Stage::RuleFiltering, ctx, state, &instructions).await?;

    let mut selected: Vec<RelevantRule> = response
        .relevant_rules
        .into_iter()
        .filter(|r| ctx.rules.iter().any(|m| m.rule.id == r.rule_id))
        .filter(|r| r.relevance.is_finite() && r.relevance >= RELEVANCE_FLOOR)
        .map(|r| RelevantRule {
            rule_id: r.rule_id,
            relevance: r.relevance.clamp(0.0, 100.0).round() as u8,
            justification: r.justification,
        })
        .collect();
    selected.sort_by(|a, b| b.relevance.cmp(&a.relevance).then_with(|| a.rule_id.cmp(&b.rule_id)));
    // highest relevance wins when a rule is named more than once
    let mut seen = HashSet::new();
    selected.retain(|r| seen.insert(r.rule_id.clone()));

    state.relevant_rules = selected;
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJudgment {
    rule_id: String,
    compliant: bool,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    #[serde(default)]
    rule_judgments: Vec<RawJudgment>,
    compliance: ComplianceStatus,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

async fn targeted_summarization(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    let response: SummaryResponse = ask(
        model,
        Stage::TargetedSummarization,
        ctx,
        state,
        "For each relevant rule, judge whether the subsection complies and give a one-sentence \
         reason. Then give the overall compliance (\"compliant\", \"partially_compliant\" or \
         \"non_compliant\"), the key points, and up to three suggestions only if it is not \
         compliant. Reply as {\"ruleJudgments\": [{\"ruleId\": string, \"compliant\": boolean, \
         \"reason\": string}], \"compliance\": string, \"keyPoints\": [string], \
         \"suggestions\": [string]}.",
    )
    .await?;

    let judgments: Vec<RuleJudgment> = response
        .rule_judgments
        .into_iter()
        .filter(|j| {
            state.relevant_rules.is_empty() || state.relevant_rules.iter().any(|r| r.rule_id == j.rule_id)
        })
        .map(|j| RuleJudgment {
            rule_id: j.rule_id,
            compliant: j.compliant,
            reason: j.reason,
        })
        .collect();

    let mut compliance = response.compliance;
    if compliance.is_compliant() && judgments.iter().any(|j| !j.compliant) {
        compliance = ComplianceStatus::PartiallyCompliant;
    }

    let suggestions = if compliance.is_compliant() {
        Vec::new()
    } else {
        let mut s = enforce_brevity(response.suggestions);
        s.truncate(MAX_SUGGESTIONS);
        s
    };

    state.judgments = judgments;
    state.assessment = Some(Assessment {
        compliance,
        key_points: response.key_points,
        suggestions,
    });
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevisionResponse {
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

async fn feedback_integration(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    let Some(feedback) = &ctx.feedback else {
        return Ok(());
    };

    let mut instructions = String::from(
        "Adjust the key points and suggestions of the current assessment using the reviewer \
         feedback below. Keep the compliance judgment. Reply as {\"keyPoints\": [string], \
         \"suggestions\": [string]}.\n\nReviewer feedback:\n",
    );
    for comment in feedback.comments.iter().filter(|c| !c.trim().is_empty()) {
        instructions.push_str(&format!("- {}\n", comment.trim()));
    }
    if let Some(example) = &feedback.improved_example {
        instructions.push_str(&format!("\nApproved rewrite of similar content:\n{}\n", example));
    }

    let response: RevisionResponse = ask(model, Stage::FeedbackIntegration, ctx, state, &instructions).await?;

    let mut assessment = state.assessment();
    assessment.key_points = response.key_points;
    if !assessment.compliance.is_compliant() {
        assessment.suggestions = response.suggestions;
    }
    state.assessment = Some(assessment);
    Ok(())
}

async fn quality_assurance(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    let response: RevisionResponse = ask(
        model,
        Stage::QualityAssurance,
        ctx,
        state,
        "Rewrite the key points and suggestions of the current assessment so each is one short, \
         concrete sentence about this subsection. Remove generic advice. Reply as \
         {\"keyPoints\": [string], \"suggestions\": [string]}.",
    )
    .await?;

    let mut assessment = state.assessment();
    assessment.key_points = enforce_brevity(response.key_points);
    assessment.suggestions = if assessment.compliance.is_compliant() {
        Vec::new()
    } else {
        enforce_brevity(response.suggestions)
    };
    state.assessment = Some(assessment);
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelevanceResponse {
    #[serde(default)]
    misapplied_rules: Vec<String>,
    #[serde(default)]
    compliance: Option<ComplianceStatus>,
    #[serde(default)]
    key_points: Option<Vec<String>>,
}

async fn contextual_relevance(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    let siblings: String = ctx.siblings.keys().map(|title| format!("- {}\n", title)).collect();
    let instructions = format!(
        "Check that every rule cited in the assessment applies to this subsection and not to one \
         of its siblings. List the rule ids that do not apply and, if needed, the corrected \
         compliance and key points. Reply as {{\"misappliedRules\": [string], \"compliance\": \
         string or null, \"keyPoints\": [string] or null}}.\n\nSibling subsections:\n{}",
        if siblings.is_empty() { "(none)\n".to_string() } else { siblings }
    );
    let response: RelevanceResponse = ask(model, Stage::ContextualRelevance, ctx, state, &instructions).await?;

    let misapplied: Vec<String> = response
        .misapplied_rules
        .into_iter()
        .filter(|id| {
            state.judgments.iter().any(|j| &j.rule_id == id)
                || state.relevant_rules.iter().any(|r| &r.rule_id == id)
        })
        .collect();

    state.judgments.retain(|j| !misapplied.contains(&j.rule_id));
    state.relevant_rules.retain(|r| !misapplied.contains(&r.rule_id));

    let mut assessment = state.assessment();
    match response.compliance {
        Some(compliance) => assessment.compliance = compliance,
        None if !misapplied.is_empty()
            && assessment.compliance == ComplianceStatus::NonCompliant
            && state.judgments.iter().all(|j| j.compliant) =>
        {
            assessment.compliance = ComplianceStatus::PartiallyCompliant;
        }
        None => {}
    }
    if let Some(points) = response.key_points {
        assessment.key_points = enforce_brevity(points);
    }
    if assessment.compliance.is_compliant() {
        assessment.suggestions.clear();
    }

    state.misapplied_rules = misapplied;
    state.assessment = Some(assessment);
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalResponse {
    verdict: String,
    compliance: ComplianceStatus,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    explanation: String,
}

async fn iterative_refinement(
    model: &dyn LanguageModel,
    ctx: &SubsectionContext,
    state: &mut ChainState,
) -> Result<(), StageError> {
    let response: FinalResponse = ask(
        model,
        Stage::IterativeRefinement,
        ctx,
        state,
        "Write the final verdict for the author as one or two conversational sentences, the final \
         compliance, one or two key points and an internal explanation of how you got there. \
         Reply as {\"verdict\": string, \"compliance\": string, \"keyPoints\": [string], \
         \"explanation\": string}.",
    )
    .await?;

    let verdict = response.verdict.trim().to_string();
    if verdict.is_empty() {
        return Err(StageError::Parse(ParseError::Invalid("empty verdict".to_string())));
    }

    let key_points = if response.key_points.is_empty() {
        state.assessment().key_points
    } else {
        response.key_points
    };

    state.final_verdict = Some(FinalVerdict {
        verdict,
        compliance: response.compliance,
        key_points: bounded_key_points(key_points, response.compliance),
        explanation: response.explanation,
    });
    Ok(())
}
