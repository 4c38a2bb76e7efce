use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::SummarizerConfig;
use crate::error::{PipelineError, Result};
use crate::scraper::PageText;
use crate::summarizer::Summarizer;

pub struct GeminiSummarizer {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::SummarizationUnavailable("Gemini API key not configured".to_string()))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PipelineError::SummarizationUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

/// Instruction sent to the model; the page text is grouped by role.
pub fn summary_prompt(text: &PageText, max_chars: usize) -> String {
    let content = format!(
        "Title: {}\nDescription: {}\nHeadings: {}\nContent: {}\nList Items: {}",
        text.title.as_deref().unwrap_or(""),
        text.meta_description.as_deref().unwrap_or(""),
        text.headings.join(" "),
        text.paragraphs.join(" "),
        text.list_items.join(" "),
    );

    format!(
        "Create a concise summary of this website in EXACTLY {max} characters or less.\n\
         This summary will be used to generate an advertising video, so focus on:\n\
         1. The core value proposition\n\
         2. What product/service is being offered\n\
         3. Why someone would want it\n\
         4. Any unique selling points\n\n\
         Website content:\n{content}\n\n\
         IMPORTANT: Your response MUST be {max} characters or less. Count carefully.",
        max = max_chars,
        content = content,
    )
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn summarize(&self, text: &PageText, max_chars: usize) -> Result<String> {
        let payload = json!({
            "contents": [{
                "parts": [{ "text": summary_prompt(text, max_chars) }]
            }]
        });

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::SummarizationUnavailable(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini returned {}: {}", status, body);
            return Err(PipelineError::SummarizationUnavailable(format!(
                "Gemini returned status {}",
                status
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::SummarizationUnavailable(format!("Invalid Gemini response: {}", e)))?;

        let summary = extract_text(&body)
            .ok_or_else(|| PipelineError::SummarizationUnavailable("Gemini returned no text".to_string()))?;

        debug!("Gemini summary: {} chars", summary.chars().count());
        Ok(summary)
    }
}

fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    let text: String = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}
