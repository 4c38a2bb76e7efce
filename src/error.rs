use std::time::Duration;

use thiserror::Error;

use crate::generation::JobStatus;
use crate::pipeline::{RunDiagnostics, Stage};

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Rendering environment unavailable: {0}")]
    RenderingEnvironmentUnavailable(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("No extractable text content")]
    EmptyContent,

    #[error("Summarization unavailable: {0}")]
    SummarizationUnavailable(String),

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Transient provider error: {0}")]
    ProviderTransient(String),

    #[error("Provider rejected request ({status}): {message}")]
    ProviderRejected { status: u16, message: String },

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Generation job {job_id} did not finish within {deadline:?}")]
    GenerationTimeout { job_id: String, deadline: Duration },

    #[error("Generation job {job_id} ended as {status}{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    GenerationFailed {
        job_id: String,
        status: JobStatus,
        reason: Option<String>,
    },

    #[error("Result for job {job_id} not ready (status {status})")]
    ResultNotReady { job_id: String, status: JobStatus },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Pipeline deadline of {0:?} exceeded")]
    PipelineTimeout(Duration),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pipeline aborted at {stage} stage{}: {source}", .job_id.as_deref().map(|id| format!(" (job {})", id)).unwrap_or_default())]
    PipelineAborted {
        stage: Stage,
        job_id: Option<String>,
        diagnostics: RunDiagnostics,
        #[source]
        source: Box<PipelineError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Recoverable,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    RetryWithBackoff,
    RetryWithLongerTimeout,
    UseFallback,
    CheckRemoteJob,
    Abort,
}

impl PipelineError {
    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::NavigationTimeout { .. }
            | PipelineError::EmptyContent
            | PipelineError::SummarizationUnavailable(_)
            | PipelineError::ProviderTransient(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            PipelineError::NavigationTimeout { .. } => RecoveryStrategy::RetryWithLongerTimeout,
            PipelineError::EmptyContent | PipelineError::SummarizationUnavailable(_) => {
                RecoveryStrategy::UseFallback
            }
            PipelineError::ProviderTransient(_) | PipelineError::ProviderUnavailable(_) => {
                RecoveryStrategy::RetryWithBackoff
            }
            PipelineError::GenerationTimeout { .. } => RecoveryStrategy::CheckRemoteJob,
            PipelineError::PipelineAborted { source, .. } => source.recovery_strategy(),
            _ => RecoveryStrategy::Abort,
        }
    }

    /// Job id attached to the failure, when a provider job exists.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            PipelineError::GenerationTimeout { job_id, .. }
            | PipelineError::GenerationFailed { job_id, .. }
            | PipelineError::ResultNotReady { job_id, .. } => Some(job_id),
            PipelineError::PipelineAborted { job_id, source, .. } => {
                job_id.as_deref().or_else(|| source.job_id())
            }
            _ => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::PipelineAborted { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error of a `PipelineAborted` chain.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::PipelineAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.is_client_error() && status.as_u16() != 429 => {
                PipelineError::ProviderRejected {
                    status: status.as_u16(),
                    message: err.to_string(),
                }
            }
            _ => PipelineError::ProviderTransient(err.to_string()),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for PipelineError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PipelineError::BrowserError(err.to_string())
    }
}
