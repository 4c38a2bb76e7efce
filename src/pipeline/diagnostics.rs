use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scrape,
    Extract,
    Prompt,
    Submit,
    Generate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Scrape => "scrape",
            Stage::Extract => "extract",
            Stage::Prompt => "prompt",
            Stage::Submit => "submit",
            Stage::Generate => "generate",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Retry,
    Fallback,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub kind: EventKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Snapshot of every retry and fallback decision taken during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub run_id: RunId,
    pub events: Vec<StageEvent>,
}

impl RunDiagnostics {
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    pub fn with_run_id(run_id: RunId) -> Self {
        Self {
            run_id,
            events: Vec::new(),
        }
    }

    pub fn fallbacks(&self) -> impl Iterator<Item = &StageEvent> {
        self.events.iter().filter(|e| e.kind == EventKind::Fallback)
    }

    pub fn has_fallback(&self, stage: Stage) -> bool {
        self.fallbacks().any(|e| e.stage == stage)
    }
}

impl Default for RunDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle stages use to append events while running concurrently.
#[derive(Debug, Clone)]
pub struct DiagnosticsRecorder {
    inner: Arc<Mutex<RunDiagnostics>>,
    run_id: RunId,
}

impl DiagnosticsRecorder {
    pub fn new(run_id: RunId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunDiagnostics::with_run_id(run_id))),
            run_id,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub async fn record(&self, stage: Stage, kind: EventKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            EventKind::Fallback | EventKind::Failure => {
                warn!("run {} [{}] {:?}: {}", self.run_id, stage, kind, message)
            }
            _ => info!("run {} [{}] {:?}: {}", self.run_id, stage, kind, message),
        }

        let mut diagnostics = self.inner.lock().await;
        diagnostics.events.push(StageEvent {
            stage,
            kind,
            message,
            at: Utc::now(),
        });
    }

    pub async fn fallback(&self, stage: Stage, message: impl Into<String>) {
        self.record(stage, EventKind::Fallback, message).await
    }

    pub async fn retry(&self, stage: Stage, message: impl Into<String>) {
        self.record(stage, EventKind::Retry, message).await
    }

    pub async fn snapshot(&self) -> RunDiagnostics {
        self.inner.lock().await.clone()
    }
}

impl Default for DiagnosticsRecorder {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recorder_keeps_order_across_clones() {
        let recorder = DiagnosticsRecorder::default();
        let other = recorder.clone();

        recorder.retry(Stage::Scrape, "navigation timed out").await;
        other.fallback(Stage::Extract, "summarizer unreachable").await;

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.run_id, recorder.run_id());
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.events[0].kind, EventKind::Retry);
        assert!(snapshot.has_fallback(Stage::Extract));
        assert!(!snapshot.has_fallback(Stage::Scrape));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Generate.to_string(), "generate");
        assert_eq!(serde_json::to_string(&Stage::Extract).unwrap(), "\"extract\"");
    }
}
