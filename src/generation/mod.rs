pub mod backoff;
pub mod client;
pub mod job;
pub mod replicate;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use backoff::PollSchedule;
pub use client::VideoGenerationClient;
pub use job::{GenerationJob, JobStatus};
pub use replicate::ReplicateProvider;

/// What gets sent to the provider for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Empty unless the model takes an image input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_images: Vec<String>,
}

/// Provider's view of a job, as returned by submit and status calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderJobState {
    pub job_id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn submit(&self, request: &GenerationRequest) -> Result<ProviderJobState>;

    async fn status(&self, job_id: &str) -> Result<ProviderJobState>;

    async fn download(&self, result_url: &str) -> Result<Vec<u8>>;

    /// Best effort; providers without a cancel endpoint keep the default.
    async fn cancel(&self, job_id: &str) -> Result<()> {
        let _ = job_id;
        Ok(())
    }
}
