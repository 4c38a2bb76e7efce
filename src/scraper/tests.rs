#[cfg(test)]
mod tests {
    use crate::browser::ImageElement;
    use crate::config::ScraperConfig;
    use crate::error::PipelineError;
    use crate::pipeline::{DiagnosticsRecorder, EventKind, Stage};
    use crate::scraper::{select_images, HtmlTextExtractor, ImageFilter, ImageScraper, TextScraper};
    use crate::testing::{article_html, image, FakeBackend, FakePage};
    use reqwest::Url;
    use std::sync::Arc;
    use std::time::Duration;

    fn page_url() -> Url {
        Url::parse("https://acme.example/products/").unwrap()
    }

    fn filter() -> ImageFilter {
        ImageFilter::from_config(&ScraperConfig::default())
    }

    fn ten_large_images() -> Vec<ImageElement> {
        (0..10)
            .map(|i| image(&format!("https://acme.example/img/{}.jpg", i), 800, 600))
            .collect()
    }

    #[test]
    fn test_max_images_keeps_first_in_document_order() {
        let images = select_images(&page_url(), &ten_large_images(), 5, &filter());

        assert_eq!(images.len(), 5);
        for (i, img) in images.iter().enumerate() {
            assert_eq!(img.image_url, format!("https://acme.example/img/{}.jpg", i));
            assert_eq!(img.source_url, "https://acme.example/products/");
        }
    }

    #[test]
    fn test_small_and_skipped_images_are_filtered() {
        let elements = vec![
            image("https://acme.example/pixel.gif", 1, 1),
            image("https://acme.example/icon.png", 32, 32),
            image("https://acme.example/banner.webp", 1600, 400),
            image("https://acme.example/banner.webp?w=800", 800, 200),
            image("https://acme.example/hero.jpg", 1200, 800),
        ];

        let images = select_images(&page_url(), &elements, 10, &filter());
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].image_url, "https://acme.example/hero.jpg");
        assert_eq!(images[0].dimensions.unwrap().area(), 1200 * 800);
    }

    #[test]
    fn test_relative_lazy_and_duplicate_sources() {
        let elements = vec![
            ImageElement {
                src: Some("data:image/gif;base64,R0lGOD".to_string()),
                lazy_src: Some("/img/lazy-a.jpg 1x, /img/lazy-a@2x.jpg 2x".to_string()),
                alt: Some("  Launch pad ".to_string()),
                ..ImageElement::default()
            },
            image("../img/team.jpg", 640, 480),
            image("https://acme.example/img/team.jpg", 640, 480),
            image("javascript:void(0)", 640, 480),
            ImageElement {
                src: Some(format!("data:image/png;base64,{}", "A".repeat(20))),
                natural_width: 500,
                natural_height: 500,
                ..ImageElement::default()
            },
        ];

        let images = select_images(&page_url(), &elements, 10, &filter());
        let urls: Vec<&str> = images.iter().map(|i| i.image_url.as_str()).collect();

        assert_eq!(
            urls,
            vec!["https://acme.example/img/lazy-a.jpg", "https://acme.example/img/team.jpg"]
        );
        assert_eq!(images[0].alt_text.as_deref(), Some("Launch pad"));
        assert!(images[0].dimensions.is_none());
    }

    #[test]
    fn test_zero_max_images_selects_nothing() {
        assert!(select_images(&page_url(), &ten_large_images(), 0, &filter()).is_empty());
    }

    #[tokio::test]
    async fn test_scrape_images_releases_session() {
        let backend = Arc::new(FakeBackend::new(FakePage {
            images: ten_large_images(),
            ..FakePage::default()
        }));
        let scraper = ImageScraper::new(backend.clone(), ScraperConfig::default());
        let diagnostics = DiagnosticsRecorder::default();

        let images = scraper
            .scrape_images("https://acme.example/products/", 5, Duration::from_secs(5), &diagnostics)
            .await
            .unwrap();

        assert_eq!(images.len(), 5);
        assert_eq!(backend.opened_count(), 1);
        assert_eq!(backend.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_navigation_timeout_retried_once_with_double_timeout() {
        let backend = Arc::new(FakeBackend::new(FakePage {
            images: ten_large_images(),
            navigation_timeouts: 1,
            ..FakePage::default()
        }));
        let scraper = ImageScraper::new(backend.clone(), ScraperConfig::default());
        let diagnostics = DiagnosticsRecorder::default();

        let images = scraper
            .scrape_images("https://acme.example/products/", 3, Duration::from_secs(4), &diagnostics)
            .await
            .unwrap();

        assert_eq!(images.len(), 3);
        assert_eq!(
            backend.requested_timeouts(),
            vec![Duration::from_secs(4), Duration::from_secs(8)]
        );
        let snapshot = diagnostics.snapshot().await;
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].kind, EventKind::Retry);
        assert_eq!(snapshot.events[0].stage, Stage::Scrape);
    }

    #[tokio::test]
    async fn test_second_navigation_timeout_is_returned() {
        let backend = Arc::new(FakeBackend::new(FakePage {
            navigation_timeouts: 2,
            ..FakePage::default()
        }));
        let scraper = ImageScraper::new(backend.clone(), ScraperConfig::default());

        let err = scraper
            .scrape_images("https://acme.example/", 3, Duration::from_secs(1), &DiagnosticsRecorder::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NavigationTimeout { .. }));
        assert_eq!(backend.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_fatal() {
        let scraper = ImageScraper::new(Arc::new(FakeBackend::unavailable()), ScraperConfig::default());

        let err = scraper
            .scrape_images("https://acme.example/", 3, Duration::from_secs(1), &DiagnosticsRecorder::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::RenderingEnvironmentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_browser_starts() {
        let backend = Arc::new(FakeBackend::new(FakePage::default()));
        let scraper = ImageScraper::new(backend.clone(), ScraperConfig::default());
        let diagnostics = DiagnosticsRecorder::default();

        let relative = scraper.scrape_images("/about", 3, Duration::from_secs(1), &diagnostics).await;
        let zero_timeout = scraper
            .scrape_images("https://acme.example/", 3, Duration::ZERO, &diagnostics)
            .await;

        assert!(matches!(relative, Err(PipelineError::InvalidRequest(_))));
        assert!(matches!(zero_timeout, Err(PipelineError::InvalidRequest(_))));
        assert_eq!(backend.opened_count(), 0);
    }

    #[test]
    fn test_text_extraction_skips_boilerplate() {
        let html = article_html(
            r#"
            <header><h1>Site chrome</h1></header>
            <nav><ul><li>Home</li><li>Pricing</li></ul></nav>
            <main>
              <h1>Reusable rockets</h1>
              <p>Acme builds   reusable rockets
                 for small satellites.</p>
              <ul><li>Launch every week</li><li><a href="/x">See the full launch manifest</a></li></ul>
              <p>Acme builds reusable rockets for small satellites.</p>
              <p></p>
            </main>
            <footer><p>Copyright Acme</p></footer>
            <script>var p = "<p>not text</p>";</script>
            "#,
        );

        let text = HtmlTextExtractor::new().unwrap().extract(&html);

        assert_eq!(text.title.as_deref(), Some("Acme Rockets"));
        assert_eq!(text.meta_description.as_deref(), Some("Rockets for everyone"));
        assert_eq!(text.headings, vec!["Reusable rockets"]);
        assert_eq!(text.paragraphs, vec!["Acme builds reusable rockets for small satellites."]);
        assert_eq!(text.list_items, vec!["Launch every week"]);
        assert_eq!(
            text.all_text(),
            "Acme builds reusable rockets for small satellites. Reusable rockets Launch every week"
        );
    }

    #[test]
    fn test_page_without_content_is_empty() {
        let html = article_html("<nav><p>Menu</p></nav><div><img src=\"a.jpg\"></div>");
        let text = HtmlTextExtractor::new().unwrap().extract(&html);

        assert!(text.is_empty());
        assert_eq!(text.title.as_deref(), Some("Acme Rockets"));
    }

    #[tokio::test]
    async fn test_scrape_text_uses_own_session() {
        let backend = Arc::new(FakeBackend::new(FakePage {
            html: article_html("<p>Fast rockets.</p>"),
            ..FakePage::default()
        }));
        let scraper = TextScraper::new(backend.clone(), ScraperConfig::default()).unwrap();

        let text = scraper
            .scrape_text("https://acme.example/", Duration::from_secs(2), &DiagnosticsRecorder::default())
            .await
            .unwrap();

        assert_eq!(text.paragraphs, vec!["Fast rockets."]);
        assert_eq!(backend.opened_count(), 1);
        assert_eq!(backend.closed_count(), 1);
    }
}
