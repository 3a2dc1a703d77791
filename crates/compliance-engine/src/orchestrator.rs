//! Document walk, per-subsection routing and bottom-up aggregation
//!
//! Subsections are analyzed strictly one after another, in document order.
//! Progress percentages and error isolation both rely on that single pass.

use shared_types::{
    Document, DocumentAnalysisResult, ProgressEvent, Section, SectionResult, SectionStatus, Subsection,
    SubsectionVerdict,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::activity::{ActivityEntry, ActivityKind, ActivityLog, TracingActivityLog};
use crate::agents::{AgentRequest, AgentSet, SectionKind};
use crate::config::AnalysisMode;
use crate::error::EngineError;
use crate::patterns::detect_placeholders;
use crate::progress::{proportional_progress, RunContext};
use crate::refinement::RefinementChain;

/// Non-compliant, score-0 verdict for a subsection that still carries
/// placeholder content; `None` when the content is complete
pub fn placeholder_verdict(subsection: &Subsection) -> Option<SubsectionVerdict> {
    let placeholders = detect_placeholders(&subsection.content);
    if placeholders.is_empty() {
        return None;
    }
    Some(SubsectionVerdict::new(
        subsection,
        false,
        0,
        vec![format!(
            "Replace placeholder content before submission: {}",
            placeholders.join(", ")
        )],
    ))
}

/// Running totals for one section
#[derive(Debug, Default)]
struct SectionAggregate {
    analyzed: usize,
    score_sum: u32,
    failed: bool,
    suggestions: Vec<String>,
    verdicts: Vec<SubsectionVerdict>,
}

impl SectionAggregate {
    fn fold(&mut self, verdict: SubsectionVerdict) {
        self.analyzed += 1;
        self.score_sum += verdict.score as u32;
        if !verdict.is_compliant {
            self.failed = true;
            self.suggestions.extend(
                verdict
                    .suggestions
                    .iter()
                    .map(|s| format!("[{}] {}", verdict.subsection_title, s)),
            );
        }
        self.verdicts.push(verdict);
    }

    fn finish(self, section: &Section) -> SectionResult {
        let score = if self.analyzed == 0 {
            0
        } else {
            (self.score_sum as f64 / self.analyzed as f64).round() as u8
        };

        SectionResult {
            section_id: section.id.clone(),
            section_title: section.title.clone(),
            status: SectionStatus::from_verdicts(&self.verdicts),
            is_compliant: !self.failed,
            score,
            suggestions: self.suggestions,
            subsections: self.verdicts,
        }
    }
}

pub struct AnalysisOrchestrator {
    agents: AgentSet,
    refinement: Option<Arc<RefinementChain>>,
    mode: AnalysisMode,
    activity: Arc<dyn ActivityLog>,
}

impl AnalysisOrchestrator {
    pub fn new(agents: AgentSet) -> Self {
        Self {
            agents,
            refinement: None,
            mode: AnalysisMode::Standard,
            activity: Arc::new(TracingActivityLog),
        }
    }

    pub fn with_activity_log(mut self, activity: Arc<dyn ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    /// Make the refinement chain available; `Deep` mode routes through it
    pub fn with_refinement(mut self, chain: Arc<RefinementChain>, mode: AnalysisMode) -> Self {
        self.refinement = Some(chain);
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// Analyze without progress reporting or external cancellation
    pub async fn analyze_document(&self, document: &Document) -> Result<DocumentAnalysisResult, EngineError> {
        self.analyze(document, &RunContext::detached()).await
    }

    /// Analyze every subsection of `document` in order.
    ///
    /// Returns a complete result, possibly containing failed subsections, or
    /// an error for cancellation and configuration failures. No partial
    /// result is ever returned.
    pub async fn analyze(
        &self,
        document: &Document,
        ctx: &RunContext<'_>,
    ) -> Result<DocumentAnalysisResult, EngineError> {
        self.activity.record(ActivityEntry::new(
            ActivityKind::RunStarted,
            &document.id,
            format!("{} sections, {:?} mode", document.sections.len(), self.mode),
        ));

        match self.walk(document, ctx).await {
            Ok(result) => {
                self.activity.record(ActivityEntry::new(
                    ActivityKind::RunCompleted,
                    &document.id,
                    if result.is_compliant { "compliant" } else { "non-compliant" },
                ));
                Ok(result)
            }
            Err(e) => {
                self.activity
                    .record(ActivityEntry::new(ActivityKind::RunAborted, &document.id, e.to_string()));
                Err(e)
            }
        }
    }

    async fn walk(&self, document: &Document, ctx: &RunContext<'_>) -> Result<DocumentAnalysisResult, EngineError> {
        let mut sections = Vec::with_capacity(document.sections.len());
        let mut is_compliant = true;

        for section in &document.sections {
            let mut aggregate = SectionAggregate::default();
            let total = section.subsections.len();

            for (index, subsection) in section.subsections.iter().enumerate() {
                if ctx.cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }

                ctx.progress
                    .on_progress(ProgressEvent {
                        progress: proportional_progress(index, total),
                        stage: format!("Analyzing {}", subsection.title),
                        section_id: section.id.clone(),
                    })
                    .await;

                let verdict = self.analyze_subsection(section, subsection, ctx).await?;
                ctx.progress.on_subsection_complete(&section.id, &verdict).await;
                aggregate.fold(verdict);
            }

            let result = aggregate.finish(section);
            debug!(
                "Section {} scored {} (compliant: {})",
                result.section_id, result.score, result.is_compliant
            );
            is_compliant &= result.is_compliant;
            sections.push(result);
        }

        info!("Document {} analyzed (compliant: {})", document.id, is_compliant);
        Ok(DocumentAnalysisResult {
            document_id: document.id.clone(),
            sections,
            is_compliant,
            analyzed_at: chrono::Utc::now(),
        })
    }

    async fn analyze_subsection(
        &self,
        section: &Section,
        subsection: &Subsection,
        ctx: &RunContext<'_>,
    ) -> Result<SubsectionVerdict, EngineError> {
        if let Some(verdict) = placeholder_verdict(subsection) {
            self.activity.record(ActivityEntry::new(
                ActivityKind::PlaceholderFlagged,
                &subsection.id,
                verdict.suggestions.join("; "),
            ));
            return Ok(verdict);
        }

        let request = AgentRequest::from_subsection(section, subsection);
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
            outcome = self.check(subsection, &request) => outcome,
        };

        match outcome {
            Ok(verdict) => {
                self.activity.record(ActivityEntry::new(
                    ActivityKind::SubsectionAnalyzed,
                    &subsection.id,
                    format!("score {} (compliant: {})", verdict.score, verdict.is_compliant),
                ));
                Ok(verdict)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.activity
                    .record(ActivityEntry::new(ActivityKind::SubsectionFailed, &subsection.id, e.to_string()));
                Ok(SubsectionVerdict::failed(subsection, e.to_string()))
            }
        }
    }

    async fn check(&self, subsection: &Subsection, request: &AgentRequest) -> Result<SubsectionVerdict, EngineError> {
        if let (AnalysisMode::Deep, Some(chain)) = (self.mode, &self.refinement) {
            let outcome = chain.analyze(request, None).await?;
            return Ok(outcome.to_verdict(subsection));
        }

        let kind = SectionKind::classify(&request.section_title, &request.title);
        let agent = self.agents.agent_for(kind);
        debug!("Routing subsection {} to {} checker", subsection.id, agent.name());
        let verdict = agent.analyze(request).await?;
        Ok(verdict.into_verdict(subsection))
    }
}
