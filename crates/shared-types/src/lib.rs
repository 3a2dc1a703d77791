pub mod types;

pub use types::{
    Document, DocumentAnalysisResult, ProgressEvent, Rule, RuleCategory, RuleSeverity, Section,
    SectionResult, SectionStatus, Subsection, SubsectionVerdict, VerdictMetadata, MAX_SCORE,
};
