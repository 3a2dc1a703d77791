use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest score a verdict can carry.
pub const MAX_SCORE: u8 = 100;

/// A listing document submitted for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub sections: Vec<Section>,
}

/// A top-level section. It has no text of its own; its verdict is derived
/// from its subsections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

/// Smallest unit of analyzable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subsection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Financial,
    Governance,
    Disclosure,
    Compliance,
    General,
}

impl RuleCategory {
    /// Lenient parse used for backend metadata; unknown values map to `General`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "financial" => RuleCategory::Financial,
            "governance" => RuleCategory::Governance,
            "disclosure" => RuleCategory::Disclosure,
            "compliance" => RuleCategory::Compliance,
            _ => RuleCategory::General,
        }
    }
}

/// Ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    High,
    Medium,
    Low,
}

impl RuleSeverity {
    /// Lenient parse used for backend metadata; unknown values map to `Medium`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" | "critical" => RuleSeverity::High,
            "low" | "info" => RuleSeverity::Low,
            _ => RuleSeverity::Medium,
        }
    }
}

/// An exchange rule or reference passage from the rule corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: RuleCategory,
    pub severity: RuleSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_document: Option<String>,
}

/// Extra context attached to a verdict for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictMetadata {
    /// Raw reasoning returned by the language model, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Best similarity score among retrieved reference passages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_score: Option<f32>,
    /// Name of the checker that produced the verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Compliance judgment for one subsection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsectionVerdict {
    pub subsection_id: String,
    pub subsection_title: String,
    pub is_compliant: bool,
    pub score: u8,
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VerdictMetadata>,
}

impl SubsectionVerdict {
    /// Build a verdict, clamping the score into `0..=100`.
    pub fn new(
        subsection: &Subsection,
        is_compliant: bool,
        score: u32,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            subsection_id: subsection.id.clone(),
            subsection_title: subsection.title.clone(),
            is_compliant,
            score: score.min(MAX_SCORE as u32) as u8,
            suggestions,
            error: None,
            metadata: None,
        }
    }

    /// Verdict for a subsection whose analysis failed inside the pipeline.
    ///
    /// Structurally identical to a content-based non-compliant verdict; the
    /// error text is kept in both the suggestion and `error`.
    pub fn failed(subsection: &Subsection, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            subsection_id: subsection.id.clone(),
            subsection_title: subsection.title.clone(),
            is_compliant: false,
            score: 0,
            suggestions: vec![format!("Analysis failed: {}", error)],
            error: Some(error),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: VerdictMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Where a section stands once its subsections have been through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// No subsection was analyzed
    Pending,
    Analyzed,
    /// At least one subsection could not be analyzed
    Failed,
}

impl SectionStatus {
    pub fn from_verdicts(verdicts: &[SubsectionVerdict]) -> Self {
        if verdicts.is_empty() {
            SectionStatus::Pending
        } else if verdicts.iter().any(|v| v.error.is_some()) {
            SectionStatus::Failed
        } else {
            SectionStatus::Analyzed
        }
    }
}

/// Aggregated verdicts for one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResult {
    pub section_id: String,
    pub section_title: String,
    pub status: SectionStatus,
    pub is_compliant: bool,
    pub score: u8,
    pub suggestions: Vec<String>,
    pub subsections: Vec<SubsectionVerdict>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysisResult {
    pub document_id: String,
    pub sections: Vec<SectionResult>,
    pub is_compliant: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// Transient progress notification, streamed but never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub progress: u8,
    pub stage: String,
    pub section_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subsection() -> Subsection {
        Subsection {
            id: "risk-1".to_string(),
            title: "Market Risk".to_string(),
            content: "Prices may fall.".to_string(),
        }
    }

    #[test]
    fn test_verdict_score_is_clamped() {
        let verdict = SubsectionVerdict::new(&subsection(), true, 250, vec![]);
        assert_eq!(verdict.score, 100);
    }

    #[test]
    fn test_failed_verdict_keeps_error_text() {
        let verdict = SubsectionVerdict::failed(&subsection(), "connection refused");
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.error.as_deref(), Some("connection refused"));
        assert!(verdict.suggestions[0].contains("connection refused"));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let verdict = SubsectionVerdict::new(&subsection(), false, 40, vec!["x".to_string()]);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["subsectionId"], "risk-1");
        assert_eq!(json["isCompliant"], false);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_section_status_from_verdicts() {
        let ok = SubsectionVerdict::new(&subsection(), false, 40, vec![]);
        let broken = SubsectionVerdict::failed(&subsection(), "timeout");

        assert_eq!(SectionStatus::from_verdicts(&[]), SectionStatus::Pending);
        assert_eq!(SectionStatus::from_verdicts(&[ok.clone()]), SectionStatus::Analyzed);
        assert_eq!(SectionStatus::from_verdicts(&[ok, broken]), SectionStatus::Failed);
        assert_eq!(serde_json::to_value(SectionStatus::Failed).unwrap(), "failed");
    }

    #[test]
    fn test_rule_enums_parse_leniently() {
        assert_eq!(RuleCategory::parse("Financial"), RuleCategory::Financial);
        assert_eq!(RuleCategory::parse("misc"), RuleCategory::General);
        assert_eq!(RuleSeverity::parse("critical"), RuleSeverity::High);
        assert_eq!(RuleSeverity::parse(""), RuleSeverity::Medium);
    }
}
