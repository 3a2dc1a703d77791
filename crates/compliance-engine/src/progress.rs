//! Progress reporting and per-run context

use async_trait::async_trait;
use shared_types::{ProgressEvent, SubsectionVerdict};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::stream::StreamMessage;

/// Receives progress from a running analysis. Reporting is optional; a sink
/// never changes the outcome of a run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, event: ProgressEvent);

    async fn on_subsection_complete(&self, _section_id: &str, _verdict: &SubsectionVerdict) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn on_progress(&self, _event: ProgressEvent) {}
}

static NO_PROGRESS: NoProgress = NoProgress;

/// Forwards progress as stream messages. A closed receiver is ignored so a
/// departed client cannot fail the run; cancellation is signalled separately.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::Sender<StreamMessage>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<StreamMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ProgressSink for ChannelProgress {
    async fn on_progress(&self, event: ProgressEvent) {
        let _ = self.tx.send(StreamMessage::from(event)).await;
    }

    async fn on_subsection_complete(&self, section_id: &str, verdict: &SubsectionVerdict) {
        let _ = self
            .tx
            .send(StreamMessage::SectionComplete {
                section_id: section_id.to_string(),
                analysis_result: verdict.clone(),
            })
            .await;
    }
}

/// Everything a single analysis run needs besides the document
pub struct RunContext<'a> {
    pub progress: &'a dyn ProgressSink,
    pub cancel: CancellationToken,
}

impl<'a> RunContext<'a> {
    pub fn new(progress: &'a dyn ProgressSink, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }
}

impl RunContext<'static> {
    /// No progress reporting and a token nobody else holds
    pub fn detached() -> Self {
        Self {
            progress: &NO_PROGRESS,
            cancel: CancellationToken::new(),
        }
    }
}

/// Position of subsection `index` within `total`, as `round(100 * (index + 1) / total)`
pub fn proportional_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * (index + 1) as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}
