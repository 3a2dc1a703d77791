//! Activity logging port
//!
//! Components record what they did through an [`ActivityLog`] handed to them
//! at construction instead of writing to shared global state. The default
//! implementation forwards to `tracing`; tests use [`NoopActivityLog`] or
//! [`MemoryActivityLog`].

use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    RunStarted,
    PlaceholderFlagged,
    SubsectionAnalyzed,
    SubsectionFailed,
    StageCompleted,
    StageFallback,
    RunCompleted,
    RunAborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    /// Document, subsection or stage the entry is about
    pub subject: String,
    pub detail: String,
}

impl ActivityEntry {
    pub fn new(kind: ActivityKind, subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

pub trait ActivityLog: Send + Sync {
    fn record(&self, entry: ActivityEntry);
}

/// Forwards entries to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, entry: ActivityEntry) {
        match entry.kind {
            ActivityKind::SubsectionFailed | ActivityKind::StageFallback | ActivityKind::RunAborted => {
                warn!(kind = ?entry.kind, subject = %entry.subject, "{}", entry.detail)
            }
            _ => info!(kind = ?entry.kind, subject = %entry.subject, "{}", entry.detail),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivityLog;

impl ActivityLog for NoopActivityLog {
    fn record(&self, _entry: ActivityEntry) {}
}

/// Keeps entries in memory for inspection
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ActivityEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, kind: ActivityKind) -> usize {
        self.entries().iter().filter(|e| e.kind == kind).count()
    }
}

impl ActivityLog for MemoryActivityLog {
    fn record(&self, entry: ActivityEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
