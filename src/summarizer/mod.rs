pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::{DiagnosticsRecorder, Stage};
use crate::scraper::text::collapse_whitespace;
use crate::scraper::{PageText, TextScraper};

pub use gemini::GeminiSummarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMethod {
    Model,
    Truncated,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub raw_text: String,
    pub summary_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub method: SummaryMethod,
}

impl PageSummary {
    pub fn placeholder(placeholder: &str) -> Self {
        Self {
            raw_text: String::new(),
            summary_text: placeholder.to_string(),
            token_count: None,
            title: None,
            method: SummaryMethod::Placeholder,
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Condenses page text to at most `max_chars` characters. Implementations
    /// may overshoot; callers re-bound the result.
    async fn summarize(&self, text: &PageText, max_chars: usize) -> Result<String>;
}

/// Deterministic summarizer used directly or as the fallback.
pub struct TruncatingSummarizer;

#[async_trait]
impl Summarizer for TruncatingSummarizer {
    fn name(&self) -> &str {
        "truncate"
    }

    async fn summarize(&self, text: &PageText, max_chars: usize) -> Result<String> {
        Ok(truncate_summary(&text.all_text(), max_chars))
    }
}

/// Bounds `text` to `max_chars` characters: whitespace collapsed, cut at the
/// last sentence end in the second half of the window, else the last word
/// boundary, else hard.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let normalized = collapse_whitespace(text);
    if normalized.chars().count() <= max_chars {
        return normalized;
    }

    let cut: String = normalized.chars().take(max_chars).collect();

    if let Some(idx) = cut.rfind(['.', '!', '?']) {
        if idx + 1 >= cut.len() / 2 {
            return cut[..=idx].to_string();
        }
    }

    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}

/// Text Extractor/Summarizer stage: scrape text in its own browser session,
/// then summarize with the configured model, falling back to truncation.
pub struct TextSummarizer {
    scraper: TextScraper,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl TextSummarizer {
    pub fn new(scraper: TextScraper, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self { scraper, summarizer }
    }

    /// `EmptyContent` when the page has no extractable text; the caller picks
    /// the placeholder. Other errors mean extraction itself failed.
    pub async fn extract_and_summarize(
        &self,
        url: &str,
        max_summary_length: usize,
        timeout: Duration,
        diagnostics: &DiagnosticsRecorder,
    ) -> Result<PageSummary> {
        if max_summary_length == 0 {
            return Err(PipelineError::InvalidRequest(
                "max_summary_length must be greater than 0".to_string(),
            ));
        }

        let text = self.scraper.scrape_text(url, timeout, diagnostics).await?;
        if text.is_empty() {
            return Err(PipelineError::EmptyContent);
        }

        let raw_text = text.all_text();
        let token_count = Some(raw_text.split_whitespace().count());

        let (summary_text, method) = match &self.summarizer {
            Some(summarizer) => match summarizer.summarize(&text, max_summary_length).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    (truncate_summary(&summary, max_summary_length), SummaryMethod::Model)
                }
                Ok(_) => {
                    diagnostics
                        .fallback(
                            Stage::Extract,
                            format!("{} returned an empty summary; truncating raw text", summarizer.name()),
                        )
                        .await;
                    (truncate_summary(&raw_text, max_summary_length), SummaryMethod::Truncated)
                }
                Err(e) => {
                    diagnostics
                        .fallback(Stage::Extract, format!("{}; truncating raw text", e))
                        .await;
                    (truncate_summary(&raw_text, max_summary_length), SummaryMethod::Truncated)
                }
            },
            None => {
                diagnostics
                    .fallback(Stage::Extract, "no summarizer configured; truncating raw text")
                    .await;
                (truncate_summary(&raw_text, max_summary_length), SummaryMethod::Truncated)
            }
        };

        info!("Summary for {} ({:?}): {}", url, method, summary_text);

        Ok(PageSummary {
            raw_text,
            summary_text,
            token_count,
            title: text.title,
            method,
        })
    }
}
