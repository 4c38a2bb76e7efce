//! Test doubles shared by the module test suites.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::browser::{ImageElement, RenderSession, RenderingBackend, SessionId};
use crate::error::{PipelineError, Result};
use crate::generation::{GenerationProvider, GenerationRequest, JobStatus, ProviderJobState};
use crate::pipeline::CancelHandle;
use crate::scraper::PageText;
use crate::summarizer::Summarizer;

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub html: String,
    pub images: Vec<ImageElement>,
    /// Number of navigations that time out before one succeeds.
    pub navigation_timeouts: usize,
    /// Navigation hangs until the caller's timeout fires.
    pub hang_navigation: bool,
}

#[derive(Default)]
pub struct FakeBackend {
    page: FakePage,
    unavailable: bool,
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub navigation_timeouts: Arc<Mutex<Vec<Duration>>>,
    remaining_timeouts: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(page: FakePage) -> Self {
        let remaining = page.navigation_timeouts;
        Self {
            page,
            remaining_timeouts: Arc::new(AtomicUsize::new(remaining)),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn requested_timeouts(&self) -> Vec<Duration> {
        self.navigation_timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderingBackend for FakeBackend {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>> {
        if self.unavailable {
            return Err(PipelineError::RenderingEnvironmentUnavailable(
                "chromium not installed".to_string(),
            ));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            id: Uuid::new_v4(),
            page: self.page.clone(),
            closed: self.closed.clone(),
            navigation_timeouts: self.navigation_timeouts.clone(),
            remaining_timeouts: self.remaining_timeouts.clone(),
            is_closed: false,
        }))
    }
}

pub struct FakeSession {
    id: SessionId,
    page: FakePage,
    closed: Arc<AtomicUsize>,
    navigation_timeouts: Arc<Mutex<Vec<Duration>>>,
    remaining_timeouts: Arc<AtomicUsize>,
    is_closed: bool,
}

#[async_trait]
impl RenderSession for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<()> {
        self.navigation_timeouts.lock().unwrap().push(timeout);
        if self.page.hang_navigation {
            tokio::time::sleep(timeout).await;
            return Err(PipelineError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }
        let remaining = self.remaining_timeouts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_timeouts.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn settle(&mut self, _delay: Duration, _max_scrolls: u32) -> Result<()> {
        Ok(())
    }

    async fn image_elements(&mut self) -> Result<Vec<ImageElement>> {
        Ok(self.page.images.clone())
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.page.html.clone())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.is_closed {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn image(src: &str, width: u32, height: u32) -> ImageElement {
    ImageElement {
        src: Some(src.to_string()),
        natural_width: width,
        natural_height: height,
        ..ImageElement::default()
    }
}

pub fn article_html(body: &str) -> String {
    format!(
        "<html><head><title>Acme Rockets</title><meta name=\"description\" content=\"Rockets for everyone\"></head><body>{}</body></html>",
        body
    )
}

pub enum SummarizerBehavior {
    Reply(String),
    Unavailable,
}

pub struct FakeSummarizer {
    behavior: SummarizerBehavior,
    pub calls: AtomicUsize,
}

impl FakeSummarizer {
    pub fn replying(text: &str) -> Self {
        Self {
            behavior: SummarizerBehavior::Reply(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            behavior: SummarizerBehavior::Unavailable,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn summarize(&self, _text: &PageText, _max_chars: usize) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SummarizerBehavior::Reply(text) => Ok(text.clone()),
            SummarizerBehavior::Unavailable => Err(PipelineError::SummarizationUnavailable(
                "connection refused".to_string(),
            )),
        }
    }
}

/// Provider that replays scripted responses. When the status script runs out
/// the last status repeats.
pub struct ScriptedProvider {
    submissions: Mutex<VecDeque<Result<ProviderJobState>>>,
    statuses: Mutex<VecDeque<Result<ProviderJobState>>>,
    last_status: Mutex<Option<ProviderJobState>>,
    download: Mutex<Option<Result<Vec<u8>>>>,
    /// Fired by `download`, which then never completes.
    cancel_on_download: Mutex<Option<CancelHandle>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(None),
            download: Mutex::new(None),
            cancel_on_download: Mutex::new(None),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_submission(self, result: Result<ProviderJobState>) -> Self {
        self.submissions.lock().unwrap().push_back(result);
        self
    }

    pub fn with_status(self, result: Result<ProviderJobState>) -> Self {
        self.statuses.lock().unwrap().push_back(result);
        self
    }

    pub fn with_download(self, result: Result<Vec<u8>>) -> Self {
        *self.download.lock().unwrap() = Some(result);
        self
    }

    pub fn with_cancel_on_download(self, handle: CancelHandle) -> Self {
        *self.cancel_on_download.lock().unwrap() = Some(handle);
        self
    }
}

pub fn state(job_id: &str, status: JobStatus) -> ProviderJobState {
    ProviderJobState {
        job_id: job_id.to_string(),
        status,
        result_url: match status {
            JobStatus::Succeeded => Some(format!("https://cdn.example.com/{}.mp4", job_id)),
            _ => None,
        },
        error: match status {
            JobStatus::Failed => Some("model crashed".to_string()),
            _ => None,
        },
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn submit(&self, request: &GenerationRequest) -> Result<ProviderJobState> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.submissions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(state("job-1", JobStatus::Queued)))
    }

    async fn status(&self, _job_id: &str) -> Result<ProviderJobState> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(state)) => {
                *self.last_status.lock().unwrap() = Some(state.clone());
                Ok(state)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last_status
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| PipelineError::ProviderTransient("no scripted status".to_string())),
        }
    }

    async fn download(&self, _result_url: &str) -> Result<Vec<u8>> {
        let cancel = self.cancel_on_download.lock().unwrap().take();
        if let Some(handle) = cancel {
            handle.cancel();
            futures::future::pending::<()>().await;
        }
        self.download
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(b"\x00\x00\x00\x18ftypmp42fake-video-bytes".to_vec()))
    }

    async fn cancel(&self, _job_id: &str) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
