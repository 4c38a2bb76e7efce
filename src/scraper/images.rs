use reqwest::Url;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::{release_session, ImageElement, RenderSession, RenderingBackend};
use crate::config::ScraperConfig;
use crate::error::Result;
use crate::pipeline::{DiagnosticsRecorder, Stage};
use crate::scraper::{load_page, validate_scrape_input, Dimensions, ScrapedImage};

/// Inline images shorter than this are placeholders, not content.
const MIN_DATA_URI_LEN: usize = 1000;

#[derive(Debug, Clone)]
pub struct ImageFilter {
    pub min_area: u64,
    pub skip_extensions: Vec<String>,
}

impl ImageFilter {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            min_area: config.min_image_area,
            skip_extensions: config.skip_extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    fn skips_extension(&self, candidate: &str) -> bool {
        let lower = candidate.to_lowercase();
        if let Some(rest) = lower.strip_prefix("data:image/") {
            return self.skip_extensions.iter().any(|ext| rest.starts_with(ext.as_str()));
        }
        let path = lower.split(['?', '#']).next().unwrap_or("");
        self.skip_extensions
            .iter()
            .any(|ext| path.ends_with(&format!(".{}", ext)))
    }
}

pub struct ImageScraper {
    backend: Arc<dyn RenderingBackend>,
    config: ScraperConfig,
    filter: ImageFilter,
}

impl ImageScraper {
    pub fn new(backend: Arc<dyn RenderingBackend>, config: ScraperConfig) -> Self {
        let filter = ImageFilter::from_config(&config);
        Self { backend, config, filter }
    }

    /// Returns at most `max_images` qualifying images in document order.
    /// An empty result is not an error.
    pub async fn scrape_images(
        &self,
        url: &str,
        max_images: usize,
        timeout: Duration,
        diagnostics: &DiagnosticsRecorder,
    ) -> Result<Vec<ScrapedImage>> {
        let page_url = validate_scrape_input(url, timeout)?;
        if max_images == 0 {
            debug!("max_images is 0, skipping image scrape for {}", page_url);
            return Ok(Vec::new());
        }

        let mut session = self.backend.open_session().await?;
        let outcome = self
            .collect(session.as_mut(), &page_url, max_images, timeout, diagnostics)
            .await;
        release_session(session).await;

        let images = outcome?;
        if images.is_empty() {
            info!("No qualifying images found on {}", page_url);
        } else {
            info!("Scraped {} images from {}", images.len(), page_url);
        }
        Ok(images)
    }

    async fn collect(
        &self,
        session: &mut dyn RenderSession,
        page_url: &Url,
        max_images: usize,
        timeout: Duration,
        diagnostics: &DiagnosticsRecorder,
    ) -> Result<Vec<ScrapedImage>> {
        load_page(session, page_url, timeout, Stage::Scrape, diagnostics).await?;
        session.settle(self.config.settle_delay, self.config.max_scrolls).await?;

        let elements = session.image_elements().await?;
        debug!("Found {} image elements on {}", elements.len(), page_url);

        Ok(select_images(page_url, &elements, max_images, &self.filter))
    }
}

/// Resolves, filters and de-duplicates image elements, keeping document order.
pub fn select_images(
    page_url: &Url,
    elements: &[ImageElement],
    max_images: usize,
    filter: &ImageFilter,
) -> Vec<ScrapedImage> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for element in elements {
        if images.len() >= max_images {
            break;
        }

        let Some(candidate) = pick_source(element) else {
            continue;
        };

        if filter.skips_extension(&candidate) {
            debug!("Skipping image with filtered extension: {}", candidate);
            continue;
        }

        let Some(image_url) = resolve_image_url(page_url, &candidate) else {
            continue;
        };

        let dimensions = element_dimensions(element);
        if let Some(dims) = dimensions {
            if dims.area() < filter.min_area {
                debug!("Skipping small image {} ({}x{})", image_url, dims.width, dims.height);
                continue;
            }
        }

        if !seen.insert(image_url.clone()) {
            continue;
        }

        images.push(ScrapedImage {
            source_url: page_url.to_string(),
            image_url,
            dimensions,
            alt_text: non_empty(element.alt.as_deref()),
            title: non_empty(element.title.as_deref()),
        });
    }

    images
}

fn pick_source(element: &ImageElement) -> Option<String> {
    let src = element.src.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let placeholder = match src {
        None => true,
        Some(s) => s.to_lowercase().ends_with(".gif") || s.starts_with("data:image/gif"),
    };

    if placeholder {
        if let Some(lazy) = element.lazy_src.as_deref().and_then(first_srcset_candidate) {
            return Some(lazy);
        }
    }
    src.map(str::to_string)
}

/// `a.jpg 1x, b.jpg 2x` -> `a.jpg`; plain URLs pass through.
fn first_srcset_candidate(value: &str) -> Option<String> {
    let value = value.trim();
    if value.starts_with("data:") {
        return Some(value.to_string());
    }
    value
        .split(',')
        .next()
        .and_then(|entry| entry.split_whitespace().next())
        .map(str::to_string)
}

fn resolve_image_url(page_url: &Url, candidate: &str) -> Option<String> {
    if candidate.starts_with("data:") {
        return (candidate.len() >= MIN_DATA_URI_LEN).then(|| candidate.to_string());
    }

    let resolved = page_url.join(candidate).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

fn element_dimensions(element: &ImageElement) -> Option<Dimensions> {
    if element.natural_width > 0 && element.natural_height > 0 {
        Some(Dimensions {
            width: element.natural_width,
            height: element.natural_height,
        })
    } else if element.rendered_width > 0 && element.rendered_height > 0 {
        Some(Dimensions {
            width: element.rendered_width,
            height: element.rendered_height,
        })
    } else {
        // not loaded yet (lazy); size unknown
        None
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
