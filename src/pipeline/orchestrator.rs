use chrono::Utc;
use rand::Rng;
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::{BrowserManager, RenderingBackend};
use crate::config::{Config, PipelineConfig};
use crate::error::{PipelineError, Result, Severity};
use crate::generation::{GenerationJob, JobStatus, ReplicateProvider, VideoGenerationClient};
use crate::pipeline::{CancelSignal, DiagnosticsRecorder, EventKind, SourceRequest, Stage, VideoArtifact};
use crate::scraper::{ImageScraper, ScrapedImage, TextScraper};
use crate::storage::ArtifactStore;
use crate::summarizer::{GeminiSummarizer, PageSummary, Summarizer, TextSummarizer};

/// Upper bound of the random jitter added to submission backoff.
const SUBMIT_JITTER_MS: u64 = 250;

/// Fills `{summary}` and `{duration}` in `template`.
pub fn build_prompt(template: &str, summary: &str, duration_seconds: u32) -> Result<String> {
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(PipelineError::InvalidPrompt("summary is empty".to_string()));
    }
    if !template.contains("{summary}") {
        return Err(PipelineError::InvalidPrompt(
            "prompt template has no {summary} placeholder".to_string(),
        ));
    }
    Ok(template
        .replace("{duration}", &duration_seconds.to_string())
        .replace("{summary}", summary))
}

/// Runs one website through scrape, summarize, generate and persist.
pub struct PipelineOrchestrator {
    image_scraper: ImageScraper,
    text_summarizer: TextSummarizer,
    generation: VideoGenerationClient,
    store: ArtifactStore,
    pipeline: PipelineConfig,
    navigation_timeout: Duration,
    placeholder: String,
}

impl PipelineOrchestrator {
    pub fn new(
        image_scraper: ImageScraper,
        text_summarizer: TextSummarizer,
        generation: VideoGenerationClient,
        store: ArtifactStore,
        config: &Config,
    ) -> Self {
        Self {
            image_scraper,
            text_summarizer,
            generation,
            store,
            pipeline: config.pipeline.clone(),
            navigation_timeout: config.scraper.navigation_timeout,
            placeholder: config.summarizer.placeholder.clone(),
        }
    }

    /// Production wiring: Chromium, Gemini (when a key is configured) and Replicate.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn RenderingBackend> = Arc::new(BrowserManager::new(config.scraper.clone()));

        let summarizer: Option<Arc<dyn Summarizer>> =
            if config.summarizer.enabled && config.summarizer.api_key.is_some() {
                Some(Arc::new(GeminiSummarizer::new(&config.summarizer)?))
            } else {
                info!("No summarization model configured, summaries will be truncated page text");
                None
            };

        let provider = Arc::new(ReplicateProvider::new(&config.provider)?);

        Ok(Self::new(
            ImageScraper::new(backend.clone(), config.scraper.clone()),
            TextSummarizer::new(TextScraper::new(backend, config.scraper.clone())?, summarizer),
            VideoGenerationClient::new(provider, config.provider.clone(), config.polling.clone()),
            ArtifactStore::new(&config.storage),
            config,
        ))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn run(&self, request: &SourceRequest) -> Result<VideoArtifact> {
        self.run_with_cancel(request, CancelSignal::never()).await
    }

    /// Every failure comes back as `PipelineAborted` carrying the stage, the
    /// job id when one exists and the run's diagnostics.
    pub async fn run_with_cancel(&self, request: &SourceRequest, cancel: CancelSignal) -> Result<VideoArtifact> {
        let run_id = Uuid::new_v4();
        let diagnostics = DiagnosticsRecorder::new(run_id);
        let deadline = self.pipeline.overall_deadline.map(|d| Instant::now() + d);
        let options = request.options();
        info!("Run {} started for {}", run_id, request.url());

        let page_url = match request.parsed_url() {
            Ok(url) => url,
            Err(e) => return Err(self.abort(Stage::Scrape, None, e, &diagnostics).await),
        };

        // 1. scrape and extract side by side
        let gathered = self
            .guarded(deadline, &cancel, async {
                tokio::join!(
                    self.image_scraper.scrape_images(
                        request.url(),
                        options.max_images,
                        self.navigation_timeout,
                        &diagnostics
                    ),
                    self.text_summarizer.extract_and_summarize(
                        request.url(),
                        options.max_summary_chars,
                        self.navigation_timeout,
                        &diagnostics
                    ),
                )
            })
            .await;
        let (images, summary) = match gathered {
            Ok(results) => results,
            Err(e) => return Err(self.abort(Stage::Scrape, None, e, &diagnostics).await),
        };

        let images = match images {
            Ok(images) => images,
            Err(e) if is_fatal_for_scrape(&e) => {
                return Err(self.abort(Stage::Scrape, None, e, &diagnostics).await);
            }
            Err(e) => {
                diagnostics
                    .fallback(Stage::Scrape, format!("{}; continuing without images", e))
                    .await;
                Vec::new()
            }
        };

        let summary = match summary {
            Ok(summary) => summary,
            Err(PipelineError::EmptyContent) => {
                diagnostics
                    .fallback(Stage::Extract, "no extractable text; using placeholder summary")
                    .await;
                PageSummary::placeholder(&self.placeholder)
            }
            Err(e) => return Err(self.abort(Stage::Extract, None, e, &diagnostics).await),
        };

        // 2. prompt
        let template = options
            .prompt_template
            .as_deref()
            .unwrap_or(&self.pipeline.prompt_template);
        let prompt = match build_prompt(template, &summary.summary_text, options.duration_seconds)
            .and_then(|prompt| self.generation.validate_prompt(&prompt).map(|_| prompt))
        {
            Ok(prompt) => prompt,
            Err(e) => return Err(self.abort(Stage::Prompt, None, e, &diagnostics).await),
        };
        info!("Run {} prompt: {}", run_id, prompt);

        // 3. submit
        let submitted = self
            .guarded(deadline, &cancel, self.submit_with_retries(&prompt, &images, &diagnostics))
            .await
            .and_then(|r| r);
        let job = match submitted {
            Ok(job) => job,
            Err(e) => return Err(self.abort(Stage::Submit, None, e, &diagnostics).await),
        };
        let job_id = job.job_id.clone();
        diagnostics
            .record(Stage::Submit, EventKind::Info, format!("accepted as job {}", job_id))
            .await;

        // 4. wait for a terminal state
        let finished = self
            .guarded(deadline, &cancel, self.generation.wait_for_completion(job, &cancel))
            .await
            .and_then(|r| r);
        let job = match finished {
            Ok(job) => job,
            Err(e) => {
                if matches!(e, PipelineError::PipelineTimeout(_)) && self.generation.polling().cancel_remote_on_timeout {
                    self.generation.cancel_remote(&job_id).await;
                }
                return Err(self.abort(Stage::Generate, Some(job_id), e, &diagnostics).await);
            }
        };
        if job.status != JobStatus::Succeeded {
            let err = PipelineError::GenerationFailed {
                job_id: job.job_id.clone(),
                status: job.status,
                reason: job.error.clone(),
            };
            return Err(self.abort(Stage::Generate, Some(job_id), err, &diagnostics).await);
        }

        // 5. download, then save without interruption
        let downloaded = self
            .guarded(deadline, &cancel, self.generation.fetch_result(&job))
            .await
            .and_then(|r| r);
        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.abort(Stage::Persist, Some(job_id), e, &diagnostics).await),
        };

        // Cancel and the overall deadline stop at the download; the save
        // always runs to completion.
        let pending = PendingArtifact {
            page_url,
            job_id: job.job_id.clone(),
            request: request.clone(),
            prompt,
            images,
            summary,
        };
        let save = tokio::spawn(pending.save(self.store.clone(), bytes, diagnostics.clone()));
        let persisted = save
            .await
            .map_err(|e| PipelineError::StorageError(format!("save task for job {} failed: {}", job_id, e)))
            .and_then(|r| r);
        match persisted {
            Ok(artifact) => {
                info!(
                    "Run {} finished: {} ({} bytes, {:.1}s)",
                    run_id,
                    artifact.local_path.display(),
                    artifact.size_bytes,
                    artifact.duration_seconds
                );
                Ok(artifact)
            }
            Err(e) => Err(self.abort(Stage::Persist, Some(job_id), e, &diagnostics).await),
        }
    }

    /// Retries only failures where the provider returned no job id.
    async fn submit_with_retries(
        &self,
        prompt: &str,
        images: &[ScrapedImage],
        diagnostics: &DiagnosticsRecorder,
    ) -> Result<GenerationJob> {
        let mut attempt = 0u32;
        loop {
            match self.generation.submit(prompt, images).await {
                Ok(job) => return Ok(job),
                Err(e) if e.severity() == Severity::Recoverable => {
                    if attempt >= self.pipeline.submit_retries {
                        return Err(PipelineError::ProviderUnavailable(format!(
                            "{} submission attempts failed: {}",
                            attempt + 1,
                            e
                        )));
                    }
                    attempt += 1;
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=SUBMIT_JITTER_MS));
                    let backoff = self.pipeline.submit_backoff * 2u32.saturating_pow(attempt - 1) + jitter;
                    diagnostics
                        .retry(
                            Stage::Submit,
                            format!("attempt {} failed: {}; retrying in {:?}", attempt, e, backoff),
                        )
                        .await;
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs `fut` unless the caller cancels or the overall deadline passes.
    async fn guarded<T>(
        &self,
        deadline: Option<Instant>,
        cancel: &CancelSignal,
        fut: impl Future<Output = T>,
    ) -> Result<T> {
        let bounded = async {
            match deadline {
                Some(at) => timeout_at(at, fut).await.map_err(|_| {
                    PipelineError::PipelineTimeout(self.pipeline.overall_deadline.unwrap_or_default())
                }),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            out = bounded => out,
        }
    }

    async fn abort(
        &self,
        stage: Stage,
        job_id: Option<String>,
        source: PipelineError,
        diagnostics: &DiagnosticsRecorder,
    ) -> PipelineError {
        let job_id = job_id.or_else(|| source.job_id().map(str::to_string));
        error!(
            "Run {} aborted at {} stage{}: {}",
            diagnostics.run_id(),
            stage,
            job_id.as_deref().map(|id| format!(" (job {})", id)).unwrap_or_default(),
            source
        );
        diagnostics.record(stage, EventKind::Failure, source.to_string()).await;

        PipelineError::PipelineAborted {
            stage,
            job_id,
            diagnostics: diagnostics.snapshot().await,
            source: Box::new(source),
        }
    }
}

/// Everything a finished run needs besides the video bytes.
struct PendingArtifact {
    page_url: Url,
    job_id: String,
    request: SourceRequest,
    prompt: String,
    images: Vec<ScrapedImage>,
    summary: PageSummary,
}

impl PendingArtifact {
    async fn save(self, store: ArtifactStore, bytes: Vec<u8>, diagnostics: DiagnosticsRecorder) -> Result<VideoArtifact> {
        let stored = store.persist(&self.page_url, &self.job_id, &bytes).await?;

        let duration_seconds = match stored.duration_seconds {
            Some(seconds) => seconds,
            None => {
                let requested = self.request.options().duration_seconds as f64;
                diagnostics
                    .record(
                        Stage::Persist,
                        EventKind::Info,
                        format!("no movie header duration; assuming requested {}s", requested),
                    )
                    .await;
                requested
            }
        };

        let mut artifact = VideoArtifact {
            metadata_path: store.planned_metadata_path(&stored.path),
            local_path: stored.path,
            duration_seconds,
            source_request: self.request,
            generation_job_id: self.job_id,
            run_id: diagnostics.run_id(),
            prompt: self.prompt,
            size_bytes: stored.size_bytes,
            created_at: Utc::now(),
            images: self.images,
            summary: self.summary,
            diagnostics: diagnostics.snapshot().await,
        };

        if let Err(e) = store.write_metadata(&artifact).await {
            warn!("Metadata for job {} not written: {}", artifact.generation_job_id, e);
            diagnostics
                .record(Stage::Persist, EventKind::Failure, format!("metadata not written: {}", e))
                .await;
            artifact.metadata_path = None;
            artifact.diagnostics = diagnostics.snapshot().await;
        }

        Ok(artifact)
    }
}

/// Image scraping is optional except when the browser itself is unusable.
fn is_fatal_for_scrape(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::RenderingEnvironmentUnavailable(_) | PipelineError::InvalidRequest(_)
    )
}
