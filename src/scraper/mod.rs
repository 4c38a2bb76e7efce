pub mod images;
pub mod text;

#[cfg(test)]
mod tests;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::browser::RenderSession;
use crate::error::{PipelineError, Result};
use crate::pipeline::{DiagnosticsRecorder, Stage};

pub use images::{select_images, ImageFilter, ImageScraper};
pub use text::{HtmlTextExtractor, PageText, TextScraper};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedImage {
    pub source_url: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

pub(crate) fn validate_scrape_input(url: &str, timeout: Duration) -> Result<Url> {
    if timeout.is_zero() {
        return Err(PipelineError::InvalidRequest("timeout must be greater than 0".to_string()));
    }
    crate::pipeline::parse_absolute_url(url)
}

/// Navigates, retrying a timed-out navigation once with double the timeout.
pub(crate) async fn load_page(
    session: &mut dyn RenderSession,
    url: &Url,
    timeout: Duration,
    stage: Stage,
    diagnostics: &DiagnosticsRecorder,
) -> Result<()> {
    match session.navigate(url, timeout).await {
        Err(PipelineError::NavigationTimeout { .. }) => {
            let retry_timeout = timeout * 2;
            diagnostics
                .retry(
                    stage,
                    format!("navigation to {} timed out after {:?}, retrying with {:?}", url, timeout, retry_timeout),
                )
                .await;
            session.navigate(url, retry_timeout).await
        }
        other => other,
    }?;

    info!("Loaded {} in session {}", url, session.id());
    Ok(())
}
