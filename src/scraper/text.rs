use ::scraper::{ElementRef, Html, Selector};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::{release_session, RenderSession, RenderingBackend};
use crate::config::ScraperConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::{DiagnosticsRecorder, Stage};
use crate::scraper::{load_page, validate_scrape_input};

/// Containers whose text is navigation or chrome rather than content.
const BOILERPLATE_TAGS: [&str; 8] = ["nav", "header", "footer", "aside", "script", "style", "noscript", "form"];

/// Blocks where more than this share of the text is link text are menus.
const MAX_LINK_DENSITY: f64 = 0.5;

/// Visible text of a rendered page, grouped the way the summary prompt uses it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<String>,
    pub paragraphs: Vec<String>,
    pub list_items: Vec<String>,
}

impl PageText {
    pub fn is_empty(&self) -> bool {
        self.headings.is_empty() && self.paragraphs.is_empty() && self.list_items.is_empty()
    }

    /// Paragraphs, then headings, then list items, space separated.
    pub fn all_text(&self) -> String {
        self.paragraphs
            .iter()
            .chain(self.headings.iter())
            .chain(self.list_items.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// html parser for the readable text of a page
pub struct HtmlTextExtractor {
    title_selector: Selector,
    meta_description_selector: Selector,
    block_selector: Selector,
    link_selector: Selector,
}

impl HtmlTextExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title_selector: Selector::parse("title")
                .map_err(|e| PipelineError::ParseError(format!("Invalid title selector: {}", e)))?,
            meta_description_selector: Selector::parse("meta[name='description']")
                .map_err(|e| PipelineError::ParseError(format!("Invalid meta selector: {}", e)))?,
            block_selector: Selector::parse("h1, h2, h3, h4, h5, h6, p, li")
                .map_err(|e| PipelineError::ParseError(format!("Invalid block selector: {}", e)))?,
            link_selector: Selector::parse("a")
                .map_err(|e| PipelineError::ParseError(format!("Invalid link selector: {}", e)))?,
        })
    }

    pub fn extract(&self, html: &str) -> PageText {
        let document = Html::parse_document(html);
        let mut text = PageText {
            title: document
                .select(&self.title_selector)
                .next()
                .map(|t| collapse_whitespace(&t.text().collect::<String>()))
                .filter(|t| !t.is_empty()),
            meta_description: document
                .select(&self.meta_description_selector)
                .next()
                .and_then(|m| m.value().attr("content"))
                .map(collapse_whitespace)
                .filter(|d| !d.is_empty()),
            ..PageText::default()
        };

        let mut seen = HashSet::new();
        for block in document.select(&self.block_selector) {
            if in_boilerplate(&block) {
                continue;
            }

            let content = collapse_whitespace(&block.text().collect::<Vec<_>>().join(" "));
            if content.is_empty() {
                continue;
            }

            if self.link_density(&block, &content) > MAX_LINK_DENSITY {
                debug!("Skipping link-heavy block: {}", content);
                continue;
            }

            if !seen.insert(content.clone()) {
                continue;
            }

            match block.value().name() {
                "p" => text.paragraphs.push(content),
                "li" => text.list_items.push(content),
                _ => text.headings.push(content),
            }
        }

        text
    }

    fn link_density(&self, block: &ElementRef, content: &str) -> f64 {
        let link_chars: usize = block
            .select(&self.link_selector)
            .map(|a| collapse_whitespace(&a.text().collect::<Vec<_>>().join(" ")).chars().count())
            .sum();
        let total = content.chars().count();
        if total == 0 {
            0.0
        } else {
            link_chars as f64 / total as f64
        }
    }
}

fn in_boilerplate(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| BOILERPLATE_TAGS.contains(&ancestor.value().name()))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct TextScraper {
    backend: Arc<dyn RenderingBackend>,
    config: ScraperConfig,
    extractor: HtmlTextExtractor,
}

impl TextScraper {
    pub fn new(backend: Arc<dyn RenderingBackend>, config: ScraperConfig) -> Result<Self> {
        Ok(Self {
            backend,
            config,
            extractor: HtmlTextExtractor::new()?,
        })
    }

    pub async fn scrape_text(
        &self,
        url: &str,
        timeout: Duration,
        diagnostics: &DiagnosticsRecorder,
    ) -> Result<PageText> {
        let page_url = validate_scrape_input(url, timeout)?;

        let mut session = self.backend.open_session().await?;
        let outcome = self.collect(session.as_mut(), &page_url, timeout, diagnostics).await;
        release_session(session).await;

        let html = outcome?;
        let text = self.extractor.extract(&html);
        info!(
            "Extracted {} headings, {} paragraphs, {} list items from {}",
            text.headings.len(),
            text.paragraphs.len(),
            text.list_items.len(),
            page_url
        );
        Ok(text)
    }

    async fn collect(
        &self,
        session: &mut dyn RenderSession,
        page_url: &Url,
        timeout: Duration,
        diagnostics: &DiagnosticsRecorder,
    ) -> Result<String> {
        load_page(session, page_url, timeout, Stage::Extract, diagnostics).await?;
        session.settle(self.config.settle_delay, self.config.max_scrolls).await?;
        session.html().await
    }
}
