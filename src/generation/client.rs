use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::{PollingConfig, ProviderConfig};
use crate::error::{PipelineError, Result, Severity};
use crate::generation::{GenerationJob, GenerationProvider, GenerationRequest, JobStatus, PollSchedule};
use crate::pipeline::CancelSignal;
use crate::scraper::ScrapedImage;

pub struct VideoGenerationClient {
    provider: Arc<dyn GenerationProvider>,
    provider_config: ProviderConfig,
    polling: PollingConfig,
}

impl VideoGenerationClient {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        provider_config: ProviderConfig,
        polling: PollingConfig,
    ) -> Self {
        Self {
            provider,
            provider_config,
            polling,
        }
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    /// Checks a prompt the way `submit` does, without talking to the provider.
    pub fn validate_prompt(&self, prompt: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(PipelineError::InvalidPrompt("prompt is empty".to_string()));
        }
        let len = prompt.chars().count();
        if len > self.provider_config.max_prompt_chars {
            return Err(PipelineError::InvalidPrompt(format!(
                "prompt is {} characters, provider accepts at most {}",
                len, self.provider_config.max_prompt_chars
            )));
        }
        Ok(())
    }

    pub fn build_request(&self, prompt: &str, reference_images: &[ScrapedImage]) -> GenerationRequest {
        let reference_images = match &self.provider_config.image_input_field {
            Some(_) => reference_images.iter().map(|i| i.image_url.clone()).collect(),
            None => Vec::new(),
        };
        GenerationRequest {
            prompt: prompt.to_string(),
            negative_prompt: self.provider_config.negative_prompt.clone(),
            reference_images,
        }
    }

    /// One submission attempt. Retrying is the caller's decision.
    pub async fn submit(&self, prompt: &str, reference_images: &[ScrapedImage]) -> Result<GenerationJob> {
        self.validate_prompt(prompt)?;
        let request = self.build_request(prompt, reference_images);

        let state = self.provider.submit(&request).await?;
        if state.job_id.trim().is_empty() {
            return Err(PipelineError::ParseError("provider accepted job without an id".to_string()));
        }

        let mut job = GenerationJob::new(state.job_id.clone(), prompt);
        job.apply(&state);
        info!("Submitted generation job {} ({})", job.job_id, job.status);
        Ok(job)
    }

    /// Refreshes `job` from the provider and returns its status.
    pub async fn poll(&self, job: &mut GenerationJob) -> Result<JobStatus> {
        if job.status.is_terminal() {
            return Ok(job.status);
        }
        let state = self.provider.status(&job.job_id).await?;
        job.apply(&state);
        Ok(job.status)
    }

    /// Polls until the job is terminal, the deadline passes or `cancel` fires.
    /// A terminal job is returned as is; callers check for `Succeeded`.
    pub async fn wait_for_completion(&self, mut job: GenerationJob, cancel: &CancelSignal) -> Result<GenerationJob> {
        let deadline = Instant::now() + self.polling.deadline;
        let mut schedule = PollSchedule::from_config(&self.polling);
        let mut consecutive_failures = 0u32;

        while !job.status.is_terminal() {
            let interval = schedule.next().unwrap_or(self.polling.max_interval);
            let wake = (Instant::now() + interval).min(deadline);

            tokio::select! {
                _ = cancel.cancelled() => {
                    job.mark_cancelled("cancelled by caller");
                    info!("Stopped polling job {}: cancelled", job.job_id);
                    return Err(PipelineError::Cancelled);
                }
                _ = sleep_until(wake) => {}
            }

            match self.poll(&mut job).await {
                Ok(status) => {
                    consecutive_failures = 0;
                    debug!("Job {} is {}", job.job_id, status);
                }
                Err(e) if e.severity() == Severity::Recoverable => {
                    consecutive_failures += 1;
                    warn!(
                        "Polling job {} failed ({}/{}): {}",
                        job.job_id, consecutive_failures, self.polling.max_transient_retries, e
                    );
                    if consecutive_failures > self.polling.max_transient_retries {
                        return Err(PipelineError::ProviderUnavailable(format!(
                            "{} consecutive status failures for job {}: {}",
                            consecutive_failures, job.job_id, e
                        )));
                    }
                }
                Err(e) => return Err(e),
            }

            if !job.status.is_terminal() && Instant::now() >= deadline {
                warn!("Job {} still {} after {:?}", job.job_id, job.status, self.polling.deadline);
                job.mark_cancelled("generation deadline exceeded");
                if self.polling.cancel_remote_on_timeout {
                    self.cancel_remote(&job.job_id).await;
                }
                return Err(PipelineError::GenerationTimeout {
                    job_id: job.job_id,
                    deadline: self.polling.deadline,
                });
            }
        }

        info!("Job {} finished as {}", job.job_id, job.status);
        Ok(job)
    }

    /// Downloads the video of a succeeded job.
    pub async fn fetch_result(&self, job: &GenerationJob) -> Result<Vec<u8>> {
        if job.status != JobStatus::Succeeded {
            return Err(PipelineError::ResultNotReady {
                job_id: job.job_id.clone(),
                status: job.status,
            });
        }
        let url = job.result_url.as_deref().ok_or_else(|| {
            PipelineError::ParseError(format!("job {} succeeded without a result URL", job.job_id))
        })?;

        let mut schedule = PollSchedule::from_config(&self.polling);
        let mut attempt = 0u32;
        loop {
            match self.provider.download(url).await {
                Ok(bytes) if bytes.is_empty() => {
                    return Err(PipelineError::ParseError(format!("job {} result is empty", job.job_id)));
                }
                Ok(bytes) => {
                    info!("Downloaded {} bytes for job {}", bytes.len(), job.job_id);
                    return Ok(bytes);
                }
                Err(e) if e.severity() == Severity::Recoverable && attempt < self.polling.max_transient_retries => {
                    attempt += 1;
                    warn!("Download for job {} failed (attempt {}): {}", job.job_id, attempt, e);
                    let delay = schedule.next().unwrap_or(self.polling.max_interval);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort remote cancellation.
    pub async fn cancel_remote(&self, job_id: &str) {
        match self.provider.cancel(job_id).await {
            Ok(()) => info!("Requested cancellation of job {}", job_id),
            Err(e) => warn!("Could not cancel job {}: {}", job_id, e),
        }
    }
}
