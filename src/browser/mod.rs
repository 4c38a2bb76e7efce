pub mod manager;
pub mod scripts;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

pub use manager::{BrowserManager, BrowserSession};

pub type SessionId = Uuid;

/// An `<img>` element as reported by the page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    #[serde(default)]
    pub src: Option<String>,
    /// First non-empty lazy-load attribute (`data-src`, `data-lazy-src`, ...).
    #[serde(default)]
    pub lazy_src: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub natural_width: u32,
    #[serde(default)]
    pub natural_height: u32,
    #[serde(default)]
    pub rendered_width: u32,
    #[serde(default)]
    pub rendered_height: u32,
}

/// Starts isolated browser sessions. Implementations must never hand out the
/// same session twice.
#[async_trait]
pub trait RenderingBackend: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>>;
}

#[async_trait]
pub trait RenderSession: Send {
    fn id(&self) -> SessionId;
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<()>;
    /// Waits `delay`, then scrolls until the page stops growing or `max_scrolls` is hit.
    async fn settle(&mut self, delay: Duration, max_scrolls: u32) -> Result<()>;
    async fn image_elements(&mut self) -> Result<Vec<ImageElement>>;
    async fn html(&mut self) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

/// Closes a session, logging instead of failing: the caller's outcome wins.
pub async fn release_session(mut session: Box<dyn RenderSession>) {
    let id = session.id();
    if let Err(e) = session.close().await {
        warn!("Failed to close browser session {}: {}", id, e);
    }
}
