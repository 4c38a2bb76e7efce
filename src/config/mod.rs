use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

pub const REPLICATE_TOKEN_ENV: &str = "REPLICATE_API_TOKEN";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub scraper: ScraperConfig,
    pub summarizer: SummarizerConfig,
    pub provider: ProviderConfig,
    pub polling: PollingConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    pub headless: bool,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    pub max_scrolls: u32,
    pub min_image_area: u64,
    pub window_size: (u32, u32),
    pub user_agent: String,
    pub skip_extensions: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SummarizerConfig {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub placeholder: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub base_url: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Model input field that accepts a reference image URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_input_field: Option<String>,
    pub max_prompt_chars: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,
    pub max_transient_retries: u32,
    pub cancel_remote_on_timeout: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// `{summary}` and `{duration}` are substituted.
    pub prompt_template: String,
    pub submit_retries: u32,
    #[serde(with = "humantime_serde")]
    pub submit_backoff: Duration,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub overall_deadline: Option<Duration>,
    pub default_max_images: usize,
    pub default_max_summary_chars: usize,
    pub default_duration_seconds: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub directory: PathBuf,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub retention: Option<Duration>,
    pub write_metadata: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            summarizer: SummarizerConfig::default(),
            provider: ProviderConfig::default(),
            polling: PollingConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            max_scrolls: 5,
            min_image_area: 100 * 100,
            window_size: (1920, 1080),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            skip_extensions: vec!["webp".to_string()],
            launch_timeout: Duration::from_secs(20),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            request_timeout: Duration::from_secs(30),
            placeholder: "a modern website presenting its products and services".to_string(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: "https://api.replicate.com/v1".to_string(),
            model: "wan-video/wan-2.1-1.3b".to_string(),
            negative_prompt: Some("poor quality, blurry, low resolution".to_string()),
            image_input_field: None,
            max_prompt_chars: 2000,
            request_timeout: Duration::from_secs(60),
            pool_max_idle_per_host: 10,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            deadline: Duration::from_secs(15 * 60),
            max_transient_retries: 5,
            cancel_remote_on_timeout: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prompt_template: "Create a {duration}-second advertisement video for a website about: {summary}".to_string(),
            submit_retries: 3,
            submit_backoff: Duration::from_secs(2),
            overall_deadline: None,
            default_max_images: 5,
            default_max_summary_chars: 300,
            default_duration_seconds: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./video"),
            retention: None,
            write_metadata: true,
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&config_content)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        // scraper
        if config.scraper.navigation_timeout.is_zero() {
            return Err(config_error("navigation_timeout must be greater than 0"));
        }
        if config.scraper.launch_timeout.is_zero() {
            return Err(config_error("launch_timeout must be greater than 0"));
        }
        if config.scraper.max_scrolls > 50 {
            return Err(config_error("max_scrolls cannot exceed 50"));
        }
        if config.scraper.window_size.0 == 0 || config.scraper.window_size.1 == 0 {
            return Err(config_error("window_size dimensions must be greater than 0"));
        }

        // summarizer
        if config.summarizer.enabled && !is_http_url(&config.summarizer.endpoint) {
            return Err(config_error("summarizer endpoint must start with http:// or https://"));
        }
        if config.summarizer.placeholder.trim().is_empty() {
            return Err(config_error("summarizer placeholder cannot be empty"));
        }

        // provider
        if !is_http_url(&config.provider.base_url) {
            return Err(config_error("provider base_url must start with http:// or https://"));
        }
        if config.provider.model.split('/').count() != 2 {
            return Err(PipelineError::ConfigError(format!(
                "provider model '{}' must look like 'owner/name'",
                config.provider.model
            )));
        }
        if config.provider.max_prompt_chars == 0 {
            return Err(config_error("max_prompt_chars must be greater than 0"));
        }

        // polling
        let polling = &config.polling;
        if polling.initial_interval.is_zero() {
            return Err(config_error("initial_interval must be greater than 0"));
        }
        if polling.initial_interval > polling.max_interval {
            return Err(config_error("initial_interval cannot exceed max_interval"));
        }
        if !(polling.multiplier >= 1.0 && polling.multiplier.is_finite()) {
            return Err(config_error("multiplier must be a finite number >= 1.0"));
        }
        if polling.deadline.is_zero() {
            return Err(config_error("polling deadline must be greater than 0"));
        }
        if polling.max_transient_retries > 20 {
            return Err(config_error("max_transient_retries cannot exceed 20"));
        }

        // pipeline
        if !config.pipeline.prompt_template.contains("{summary}") {
            return Err(config_error("prompt_template must contain a {summary} placeholder"));
        }
        if config.pipeline.submit_retries > 10 {
            return Err(config_error("submit_retries cannot exceed 10"));
        }
        if let Some(deadline) = config.pipeline.overall_deadline {
            if deadline.is_zero() {
                return Err(config_error("overall_deadline must be greater than 0"));
            }
        }
        if config.pipeline.default_max_summary_chars == 0 {
            return Err(config_error("default_max_summary_chars must be greater than 0"));
        }

        // storage
        if config.storage.directory.as_os_str().is_empty() {
            return Err(config_error("storage directory cannot be empty"));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::ConfigError(format!("Failed to create config directory: {}", e)))?;
            }
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}

/// Credentials from the environment win over the file. Only called at load time.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(REPLICATE_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
        debug!("Using provider token from {}", REPLICATE_TOKEN_ENV);
        config.provider.api_token = Some(token);
    }
    if let Some(key) = lookup(GEMINI_KEY_ENV).filter(|v| !v.trim().is_empty()) {
        debug!("Using summarizer key from {}", GEMINI_KEY_ENV);
        config.summarizer.api_key = Some(key);
    }
}

fn config_error(message: &str) -> PipelineError {
    PipelineError::ConfigError(message.to_string())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
