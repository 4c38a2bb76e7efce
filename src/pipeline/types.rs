use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, RecoveryStrategy, Result};
use crate::pipeline::diagnostics::{RunDiagnostics, RunId, Stage};
use crate::scraper::ScrapedImage;
use crate::summarizer::PageSummary;

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_images: usize,
    pub max_summary_chars: usize,
    pub duration_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl GenerationOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_images: config.default_max_images,
            max_summary_chars: config.default_max_summary_chars,
            duration_seconds: config.default_duration_seconds,
            prompt_template: None,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// One pipeline input. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedSourceRequest")]
pub struct SourceRequest {
    url: String,
    options: GenerationOptions,
}

#[derive(Deserialize)]
struct UncheckedSourceRequest {
    url: String,
    options: GenerationOptions,
}

impl TryFrom<UncheckedSourceRequest> for SourceRequest {
    type Error = PipelineError;

    fn try_from(raw: UncheckedSourceRequest) -> Result<Self> {
        Self::new(raw.url, raw.options)
    }
}

impl SourceRequest {
    pub fn new(url: impl Into<String>, options: GenerationOptions) -> Result<Self> {
        let url = url.into();
        parse_absolute_url(&url)?;

        if options.max_summary_chars == 0 {
            return Err(PipelineError::InvalidRequest(
                "max_summary_chars must be greater than 0".to_string(),
            ));
        }
        if let Some(template) = &options.prompt_template {
            if !template.contains("{summary}") {
                return Err(PipelineError::InvalidRequest(
                    "prompt_template must contain a {summary} placeholder".to_string(),
                ));
            }
        }

        Ok(Self { url, options })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn parsed_url(&self) -> Result<Url> {
        parse_absolute_url(&self.url)
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }
}

pub fn parse_absolute_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| PipelineError::InvalidRequest(format!("'{}' is not a valid URL: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(PipelineError::InvalidRequest(format!(
            "'{}' must be an absolute http(s) URL",
            raw
        ))),
    }
}

/// Output of a successful run. Written once; never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub local_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
    pub duration_seconds: f64,
    pub source_request: SourceRequest,
    pub generation_job_id: String,
    pub run_id: RunId,
    pub prompt: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub images: Vec<ScrapedImage>,
    pub summary: PageSummary,
    pub diagnostics: RunDiagnostics,
}

/// Serializable view of a failed run, for callers that render errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub error: String,
    pub cause: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RunDiagnostics>,
}

impl From<&PipelineError> for FailureReport {
    fn from(err: &PipelineError) -> Self {
        let diagnostics = match err {
            PipelineError::PipelineAborted { diagnostics, .. } => Some(diagnostics.clone()),
            _ => None,
        };
        Self {
            stage: err.stage(),
            job_id: err.job_id().map(str::to_string),
            error: err.to_string(),
            cause: err.root_cause().to_string(),
            retryable: err.recovery_strategy() != RecoveryStrategy::Abort,
            diagnostics,
        }
    }
}
