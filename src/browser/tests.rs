#[cfg(test)]
mod tests {
    use crate::browser::scripts::{generate_image_enumeration_script, generate_scroll_script, LAZY_SRC_ATTRIBUTES};
    use crate::browser::{BrowserManager, ImageElement, RenderingBackend};
    use crate::config::ScraperConfig;
    use crate::error::PipelineError;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_session_reports_unavailable_environment() {
        let data_root = tempdir().unwrap();
        let mut config = ScraperConfig::default();
        config.launch_timeout = Duration::from_secs(10);
        let manager = BrowserManager::new(config).with_data_root(data_root.path().to_path_buf());

        // note: passes with or without a local Chromium install
        match manager.open_session().await {
            Ok(mut session) => {
                let _ = session.close().await;
            }
            Err(e) => {
                assert!(
                    matches!(e, PipelineError::RenderingEnvironmentUnavailable(_)),
                    "Expected rendering-environment error, got: {}",
                    e
                );
            }
        }

        // profile directories never outlive the session
        let leftovers = std::fs::read_dir(data_root.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_image_script_reads_lazy_attributes() {
        let script = generate_image_enumeration_script();

        assert!(script.contains("querySelectorAll('img')"));
        for attr in LAZY_SRC_ATTRIBUTES {
            assert!(script.contains(attr), "script should read {}", attr);
        }
        assert!(script.contains("naturalWidth"));
        assert!(script.contains("getBoundingClientRect"));
    }

    #[test]
    fn test_scroll_script_reports_height() {
        let script = generate_scroll_script();
        assert!(script.contains("scrollTo"));
        assert!(script.contains("scrollHeight"));
    }

    #[test]
    fn test_image_element_deserializes_script_output() {
        let raw = serde_json::json!([
            {
                "src": "https://example.com/hero.jpg",
                "lazySrc": null,
                "alt": "Hero",
                "title": null,
                "naturalWidth": 1200,
                "naturalHeight": 600,
                "renderedWidth": 600,
                "renderedHeight": 300
            },
            { "src": null, "lazySrc": "/img/lazy.png" }
        ]);

        let elements: Vec<ImageElement> = serde_json::from_value(raw).unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].alt.as_deref(), Some("Hero"));
        assert_eq!(elements[0].natural_width, 1200);
        assert_eq!(elements[1].lazy_src.as_deref(), Some("/img/lazy.png"));
        assert_eq!(elements[1].natural_width, 0);
    }
}
