use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::generation::ProviderJobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Position in `queued -> running -> terminal`.
    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Local view of a remote generation job. Only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub job_id: String,
    pub status: JobStatus,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationJob {
    pub fn new(job_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            prompt: prompt.into(),
            created_at: now,
            updated_at: now,
            result_url: None,
            error: None,
        }
    }

    /// Applies a provider report. Returns false when the report would move
    /// the job backwards or the job is already terminal.
    pub fn apply(&mut self, state: &ProviderJobState) -> bool {
        if state.job_id != self.job_id {
            warn!("Ignoring status for job {} on job {}", state.job_id, self.job_id);
            return false;
        }
        if self.status.is_terminal() || state.status.rank() < self.status.rank() {
            debug!(
                "Ignoring {} -> {} for job {}",
                self.status, state.status, self.job_id
            );
            return false;
        }

        if state.status != self.status {
            debug!("Job {} {} -> {}", self.job_id, self.status, state.status);
        }
        self.status = state.status;
        if state.result_url.is_some() {
            self.result_url = state.result_url.clone();
        }
        if state.error.is_some() {
            self.error = state.error.clone();
        }
        self.updated_at = Utc::now();
        true
    }

    /// Local cancellation after a deadline or caller cancel.
    pub fn mark_cancelled(&mut self, reason: impl Into<String>) {
        if !self.status.is_terminal() {
            self.status = JobStatus::Cancelled;
            self.error = Some(reason.into());
            self.updated_at = Utc::now();
        }
    }
}
