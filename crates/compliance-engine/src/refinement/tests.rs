use super::*;
use crate::activity::MemoryActivityLog;
use crate::agents::request;
use crate::testing::{rule_match, FailingModel, ScriptedModel, StaticRules, UnconfiguredModel};
use pretty_assertions::assert_eq;

const CONTEXT: &str = r#"{"purpose": "Explain use of proceeds", "keyRequirements": ["amount", "purpose"]}"#;
const FILTER: &str = r#"{"relevantRules": [
    {"ruleId": "rule-1", "relevance": 92, "justification": "direct"},
    {"ruleId": "ghost", "relevance": 99, "justification": "not a candidate"},
    {"ruleId": "rule-2", "relevance": 20, "justification": "weak"}
]}"#;
const SUMMARY_COMPLIANT: &str = r#"{"ruleJudgments": [{"ruleId": "rule-1", "compliant": true, "reason": "amount disclosed"}],
    "compliance": "compliant", "keyPoints": ["Proceeds amount and purpose are disclosed"], "suggestions": ["ignored"]}"#;
const QA: &str = r#"{"keyPoints": ["Proceeds amount and purpose are disclosed", "Ensure compliance with all rules"], "suggestions": []}"#;
const RELEVANCE: &str = r#"{"misappliedRules": []}"#;
const FINAL: &str = r#"{"verdict": "This section is compliant.", "compliance": "compliant",
    "keyPoints": ["a", "b", "c"], "explanation": "All good"}"#;

fn context(feedback: Option<FeedbackSignal>) -> SubsectionContext {
    SubsectionContext::new(
        &request("Offer", "Use of Proceeds", "We will use $10m of proceeds to repay debt."),
        vec![
            rule_match("rule-1", "Use of proceeds", "Disclose the intended use of proceeds", 0.9),
            rule_match("rule-2", "Dividend policy", "Describe the dividend policy in detail", 0.6),
        ],
        feedback,
    )
}

fn chain(model: Arc<dyn LanguageModel>) -> RefinementChain {
    RefinementChain::new(model, Arc::new(StaticRules::empty()))
}

#[tokio::test]
async fn test_happy_path_runs_every_stage_in_order() {
    let model = Arc::new(ScriptedModel::new(&[CONTEXT, FILTER, SUMMARY_COMPLIANT, QA, RELEVANCE, FINAL]));
    let log = Arc::new(MemoryActivityLog::new());
    let chain = chain(model.clone()).with_activity_log(log.clone());

    let outcome = chain.run(&context(None)).await.unwrap();

    // feedback integration makes no call without a signal
    assert_eq!(model.calls(), 6);
    let prompts = model.prompts();
    for (prompt, n) in prompts.iter().zip([1, 2, 3, 5, 6, 7]) {
        assert!(prompt.starts_with(&format!("Stage {}/7", n)), "{}", prompt);
    }
    assert_eq!(log.count(ActivityKind::StageCompleted), 7);
    assert!(outcome.fallbacks.is_empty());

    assert_eq!(outcome.relevant_rules.len(), 1);
    assert_eq!(outcome.relevant_rules[0].rule_id, "rule-1");
    assert!(outcome.suggestions.is_empty());
    assert_eq!(outcome.final_verdict.compliance, ComplianceStatus::Compliant);
    assert_eq!(outcome.final_verdict.key_points, vec!["a", "b"]);
    assert_eq!(outcome.retrieval_score, Some(0.9));
}

#[tokio::test]
async fn test_later_stages_see_prior_outputs() {
    let model = Arc::new(ScriptedModel::new(&[CONTEXT, FILTER, SUMMARY_COMPLIANT, QA, RELEVANCE, FINAL]));
    chain(model.clone()).run(&context(None)).await.unwrap();

    let prompts = model.prompts();
    assert!(!prompts[0].contains("Explain use of proceeds"));
    assert!(prompts[1].contains("Explain use of proceeds"));
    assert!(prompts[2].contains("\"ruleId\": \"rule-1\""));
}

#[tokio::test]
async fn test_rule_named_twice_is_kept_once() {
    let filter = r#"{"relevantRules": [
        {"ruleId": "rule-1", "relevance": 90, "justification": "direct"},
        {"ruleId": "rule-2", "relevance": 80, "justification": "related"},
        {"ruleId": "rule-1", "relevance": 60, "justification": "repeated"}
    ]}"#;
    let model = Arc::new(ScriptedModel::new(&[CONTEXT, filter, SUMMARY_COMPLIANT, QA, RELEVANCE, FINAL]));

    let outcome = chain(model.clone()).run(&context(None)).await.unwrap();

    let ids: Vec<&str> = outcome.relevant_rules.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["rule-1", "rule-2"]);
    assert_eq!(outcome.relevant_rules[0].relevance, 90);
    // the summarization prompt sees each rule once
    assert_eq!(model.prompts()[2].matches("\"ruleId\": \"rule-1\"").count(), 1);
}

#[tokio::test]
async fn test_feedback_signal_adds_a_stage_call() {
    let summary = r#"{"compliance": "non_compliant", "keyPoints": ["Amount missing"], "suggestions": ["State the amount"]}"#;
    let feedback = r#"{"keyPoints": ["Amount of debt repaid is missing"], "suggestions": ["State the debt amount repaid"]}"#;
    let model = Arc::new(ScriptedModel::new(&[
        CONTEXT, FILTER, summary, feedback, feedback, RELEVANCE,
        r#"{"verdict": "Please state the amount.", "compliance": "non_compliant", "keyPoints": [], "explanation": "x"}"#,
    ]));
    let signal = FeedbackSignal {
        comments: vec!["Reviewers expect the repaid debt amount".to_string()],
        improved_example: None,
    };

    let outcome = chain(model.clone()).run(&context(Some(signal))).await.unwrap();

    assert_eq!(model.calls(), 7);
    assert!(model.prompts()[3].contains("Reviewers expect the repaid debt amount"));
    assert_eq!(outcome.suggestions, vec!["State the debt amount repaid"]);
    assert_eq!(
        outcome.final_verdict.key_points,
        vec!["Amount of debt repaid is missing"]
    );

    let subsection = Subsection {
        id: "sub-1".into(),
        title: "Use of Proceeds".into(),
        content: String::new(),
    };
    let verdict = outcome.to_verdict(&subsection);
    assert!(!verdict.is_compliant);
    assert_eq!(verdict.score, 30);
    assert_eq!(verdict.suggestions, vec!["State the debt amount repaid"]);
}

#[test]
fn test_empty_feedback_is_ignored() {
    let ctx = context(Some(FeedbackSignal::default()));
    assert!(ctx.feedback.is_none());
}

#[tokio::test]
async fn test_failing_model_yields_partial_verdict() {
    let log = Arc::new(MemoryActivityLog::new());
    let chain = chain(Arc::new(FailingModel { status: 500 })).with_activity_log(log.clone());

    let outcome = chain.run(&context(None)).await.unwrap();

    assert_eq!(outcome.final_verdict.compliance, ComplianceStatus::PartiallyCompliant);
    assert!(!outcome.final_verdict.key_points.is_empty());
    assert!(outcome.final_verdict.key_points.len() <= 2);
    assert!(!outcome.final_verdict.verdict.is_empty());
    // every stage but the feedback no-op fell back
    assert_eq!(outcome.fallbacks.len(), 6);
    assert_eq!(log.count(ActivityKind::StageFallback), 6);
    // unfiltered rules are kept when filtering fails
    assert_eq!(outcome.relevant_rules.len(), 2);
}

#[tokio::test]
async fn test_garbage_output_never_aborts() {
    let model = Arc::new(ScriptedModel::always("Sorry, I cannot produce JSON today."));
    let outcome = chain(model).run(&context(None)).await.unwrap();

    assert_eq!(outcome.final_verdict.compliance, ComplianceStatus::PartiallyCompliant);
    let verdict = outcome.to_verdict(&Subsection {
        id: "sub-1".into(),
        title: "Use of Proceeds".into(),
        content: String::new(),
    });
    assert!(!verdict.is_compliant);
    assert_eq!(verdict.score, 60);
    assert_eq!(verdict.suggestions.len(), 1);
}

#[tokio::test]
async fn test_failed_final_stage_never_upgrades_compliance() {
    let model = Arc::new(ScriptedModel::new(&[
        CONTEXT, FILTER, SUMMARY_COMPLIANT, QA, RELEVANCE, "not json",
    ]));
    let outcome = chain(model).run(&context(None)).await.unwrap();

    assert_eq!(outcome.fallbacks, vec![Stage::IterativeRefinement]);
    assert_eq!(outcome.final_verdict.compliance, ComplianceStatus::PartiallyCompliant);
    assert_eq!(
        outcome.final_verdict.key_points,
        vec!["Proceeds amount and purpose are disclosed"]
    );
}

#[tokio::test]
async fn test_misapplied_rules_are_removed() {
    let summary = r#"{"ruleJudgments": [{"ruleId": "rule-1", "compliant": false, "reason": "belongs elsewhere"}],
        "compliance": "non_compliant", "keyPoints": ["Dividend policy missing"], "suggestions": ["Add dividend policy"]}"#;
    let relevance = r#"{"misappliedRules": ["rule-1", "unknown"]}"#;
    let model = Arc::new(ScriptedModel::new(&[
        CONTEXT, FILTER, summary, QA, relevance, "garbage",
    ]));
    let outcome = chain(model).run(&context(None)).await.unwrap();

    assert!(outcome.relevant_rules.is_empty());
    assert_eq!(outcome.final_verdict.compliance, ComplianceStatus::PartiallyCompliant);
}

#[tokio::test]
async fn test_configuration_error_escapes_chain() {
    let err = chain(Arc::new(UnconfiguredModel)).run(&context(None)).await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_analyze_retrieves_and_deduplicates() {
    let rules = Arc::new(StaticRules::new(vec![
        rule_match("rule-1", "Use of proceeds", "Disclose the intended use of proceeds", 0.9),
        rule_match("synthetic-1", "Use of proceeds", "Disclose the intended use of proceeds", 0.8),
    ]));
    let model = Arc::new(ScriptedModel::new(&[CONTEXT, FILTER, SUMMARY_COMPLIANT, QA, RELEVANCE, FINAL]));
    let chain = RefinementChain::new(model, rules.clone());

    let outcome = chain
        .analyze(&request("Offer", "Use of Proceeds", "We will repay debt."), None)
        .await
        .unwrap();
    assert_eq!(rules.calls(), 1);
    assert!(outcome.is_compliant());
}

#[test]
fn test_compliance_status_aliases() {
    let parsed: ComplianceStatus = serde_json::from_str("\"partially-compliant\"").unwrap();
    assert_eq!(parsed, ComplianceStatus::PartiallyCompliant);
    let parsed: ComplianceStatus = serde_json::from_str("\"non_compliant\"").unwrap();
    assert_eq!(parsed, ComplianceStatus::NonCompliant);
}

#[test]
fn test_content_length_buckets() {
    assert_eq!(ContentLength::of("short text"), ContentLength::Short);
    assert_eq!(ContentLength::of(&"word ".repeat(200)), ContentLength::Medium);
    assert_eq!(ContentLength::of(&"word ".repeat(500)), ContentLength::Long);
}
