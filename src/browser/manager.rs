use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::scripts::{generate_image_enumeration_script, generate_page_height_script, generate_scroll_script};
use crate::browser::{ImageElement, RenderSession, RenderingBackend, SessionId};
use crate::config::ScraperConfig;
use crate::error::{PipelineError, Result};

const LAUNCH_ATTEMPTS: u32 = 2;

/// Launches one private Chromium process per session.
pub struct BrowserManager {
    config: ScraperConfig,
    data_root: PathBuf,
}

impl BrowserManager {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            data_root: std::env::temp_dir(),
        }
    }

    pub fn with_data_root(mut self, data_root: PathBuf) -> Self {
        self.data_root = data_root;
        self
    }

    fn session_data_dir(&self, session_id: SessionId) -> PathBuf {
        self.data_root
            .join(format!("website-to-video-{}-{}", std::process::id(), session_id))
    }

    fn browser_config(&self, user_data_dir: &PathBuf) -> Result<BrowserConfig> {
        let (width, height) = self.config.window_size;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(user_data_dir)
            .window_size(width, height)
            .request_timeout(self.config.navigation_timeout)
            .args(vec![
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-notifications",
                "--mute-audio",
                "--no-first-run",
                "--disable-default-apps",
                "--disable-sync",
                "--disable-background-timer-throttling",
                "--disable-renderer-backgrounding",
                "--disable-blink-features=AutomationControlled",
                "--log-level=3",
            ]);

        if !self.config.headless {
            builder = builder.with_head();
        }

        builder
            .build()
            .map_err(|e| PipelineError::RenderingEnvironmentUnavailable(format!("Failed to create browser config: {}", e)))
    }

    async fn launch(&self, session_id: SessionId) -> Result<BrowserSession> {
        let user_data_dir = self.session_data_dir(session_id);
        std::fs::create_dir_all(&user_data_dir).map_err(|e| {
            PipelineError::RenderingEnvironmentUnavailable(format!("Failed to create profile directory: {}", e))
        })?;

        let browser_config = match self.browser_config(&user_data_dir) {
            Ok(config) => config,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(e);
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=LAUNCH_ATTEMPTS {
            let launch = tokio::time::timeout(self.config.launch_timeout, Browser::launch(browser_config.clone())).await;

            match launch {
                Ok(Ok((browser, handler))) => {
                    debug!("Browser for session {} launched on attempt {}", session_id, attempt);

                    let handler_task = tokio::spawn(async move {
                        let mut handler = handler;
                        while let Some(h) = handler.next().await {
                            if let Err(e) = h {
                                let error_msg = e.to_string();
                                if error_msg.contains("data did not match any variant")
                                    || error_msg.contains("untagged enum Message")
                                {
                                    debug!("Ignoring WebSocket deserialization error: {}", e);
                                } else {
                                    warn!("Browser handler error: {}", e);
                                }
                            }
                        }
                        debug!("Browser handler task ended");
                    });

                    let mut session = BrowserSession {
                        id: session_id,
                        browser,
                        page: None,
                        handler_task,
                        user_data_dir,
                        closed: false,
                    };

                    return match session.open_page(&self.config).await {
                        Ok(()) => Ok(session),
                        Err(e) => {
                            let _ = session.close().await;
                            Err(PipelineError::RenderingEnvironmentUnavailable(e.to_string()))
                        }
                    };
                }
                Ok(Err(e)) => {
                    error!("Browser launch attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    error!(
                        "Browser launch attempt {} timed out after {:?}",
                        attempt, self.config.launch_timeout
                    );
                    last_error = format!("launch timed out after {:?}", self.config.launch_timeout);
                }
            }

            if attempt < LAUNCH_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        let _ = std::fs::remove_dir_all(&user_data_dir);
        Err(PipelineError::RenderingEnvironmentUnavailable(format!(
            "Failed to launch browser after {} attempts: {}",
            LAUNCH_ATTEMPTS, last_error
        )))
    }
}

#[async_trait]
impl RenderingBackend for BrowserManager {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>> {
        let session_id = Uuid::new_v4();
        info!("Opening browser session {}", session_id);
        let session = self.launch(session_id).await?;
        Ok(Box::new(session))
    }
}

/// A browser process owned by exactly one scrape call.
///
/// Dropping an unclosed session (for example when the owning future is
/// cancelled) still kills the browser and removes its profile directory.
pub struct BrowserSession {
    id: SessionId,
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
    closed: bool,
}

impl BrowserSession {
    async fn open_page(&mut self, config: &ScraperConfig) -> Result<()> {
        let page = tokio::time::timeout(config.launch_timeout, self.browser.new_page("about:blank"))
            .await
            .map_err(|_| PipelineError::BrowserError("Timeout creating new page".to_string()))??;

        let user_agent_params = SetUserAgentOverrideParams::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| PipelineError::BrowserError(format!("Failed to build user agent params: {}", e)))?;

        page.execute(user_agent_params)
            .await
            .map_err(|e| PipelineError::BrowserError(format!("Failed to set user agent: {}", e)))?;

        self.page = Some(page);
        Ok(())
    }

    fn page(&self) -> Result<Page> {
        self.page
            .clone()
            .ok_or_else(|| PipelineError::BrowserError(format!("Session {} has no open page", self.id)))
    }

    fn remove_profile_dir(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Could not remove profile directory {:?}: {}", self.user_data_dir, e);
        }
    }
}

#[async_trait]
impl RenderSession for BrowserSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<()> {
        info!("Session {} navigating to {}", self.id, url);
        let page = self.page()?;

        match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
            Ok(Ok(_)) => {
                debug!("Session {} loaded {}", self.id, url);
                Ok(())
            }
            Ok(Err(e)) => Err(PipelineError::BrowserError(format!("Failed to navigate to {}: {}", url, e))),
            Err(_) => Err(PipelineError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    async fn settle(&mut self, delay: Duration, max_scrolls: u32) -> Result<()> {
        let page = self.page()?;
        tokio::time::sleep(delay).await;

        let mut last_height: i64 = evaluate(&page, generate_page_height_script()).await?;
        for scroll in 0..max_scrolls {
            let _: i64 = evaluate(&page, generate_scroll_script()).await?;
            tokio::time::sleep(delay).await;

            let new_height: i64 = evaluate(&page, generate_page_height_script()).await?;
            if new_height == last_height {
                debug!("Session {} reached end of page after {} scrolls", self.id, scroll + 1);
                break;
            }
            last_height = new_height;
        }
        Ok(())
    }

    async fn image_elements(&mut self) -> Result<Vec<ImageElement>> {
        let page = self.page()?;
        let elements: Vec<ImageElement> = evaluate(&page, &generate_image_enumeration_script()).await?;
        debug!("Session {} found {} image elements", self.id, elements.len());
        Ok(elements)
    }

    async fn html(&mut self) -> Result<String> {
        let page = self.page()?;
        let html = page
            .content()
            .await
            .map_err(|e| PipelineError::BrowserError(format!("Failed to get page content: {}", e)))?;
        Ok(html)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page for session {}: {}", self.id, e);
            }
        }

        let close_result = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            debug!("Failed waiting for browser exit in session {}: {}", self.id, e);
        }
        self.handler_task.abort();
        self.remove_profile_dir();

        close_result
            .map(|_| ())
            .map_err(|e| PipelineError::BrowserError(format!("Failed to close browser session: {}", e)))?;

        info!("Closed browser session {}", self.id);
        Ok(())
    }
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: &str) -> Result<T> {
    let params = EvaluateParams::builder()
        .expression(script)
        .return_by_value(true)
        .await_promise(true)
        .build()
        .map_err(|e| PipelineError::BrowserError(format!("Failed to build evaluate params: {}", e)))?;

    let result = page
        .evaluate_expression(params)
        .await
        .map_err(|e| PipelineError::BrowserError(format!("Script evaluation failed: {}", e)))?;

    result
        .into_value::<T>()
        .map_err(|e| PipelineError::ParseError(format!("Unexpected script result: {}", e)))
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Browser session {} dropped without close, killing browser", self.id);
            self.handler_task.abort();
            // Browser's own Drop kills the child process.
            self.remove_profile_dir();
        }
    }
}
