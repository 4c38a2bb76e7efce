use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{PipelineError, Result};
use crate::generation::{GenerationProvider, GenerationRequest, JobStatus, ProviderJobState};

/// Replicate predictions API.
pub struct ReplicateProvider {
    client: Client,
    base_url: String,
    model: String,
    api_token: String,
    image_input_field: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl ReplicateProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_token = config
            .api_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::ConfigError("Replicate API token not configured".to_string()))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_token,
            image_input_field: config.image_input_field.clone(),
        })
    }

    /// `owner/name` runs the latest version; `owner/name:version` pins one.
    fn submit_target(&self, input: Value) -> (String, Value) {
        match self.model.split_once(':') {
            Some((_, version)) => (
                format!("{}/predictions", self.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/models/{}/predictions", self.base_url, self.model),
                json!({ "input": input }),
            ),
        }
    }

    fn input(&self, request: &GenerationRequest) -> Value {
        let mut input = Map::new();
        input.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        if let Some(negative) = &request.negative_prompt {
            input.insert("negative_prompt".to_string(), Value::String(negative.clone()));
        }
        if let (Some(field), Some(image)) = (&self.image_input_field, request.reference_images.first()) {
            input.insert(field.clone(), Value::String(image.clone()));
        }
        Value::Object(input)
    }

    async fn prediction(&self, response: Response) -> Result<ProviderJobState> {
        let prediction: Prediction = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PipelineError::ParseError(format!("Invalid prediction response: {}", e)))?;
        prediction_state(prediction)
    }
}

/// Maps non-success responses: 429 and 5xx are transient, other 4xx are rejections.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        warn!("Replicate returned {}: {}", status, body);
        Err(PipelineError::ProviderTransient(format!("status {}: {}", status, body)))
    } else {
        Err(PipelineError::ProviderRejected {
            status: status.as_u16(),
            message: body,
        })
    }
}

fn map_status(status: &str) -> Result<JobStatus> {
    match status {
        "starting" => Ok(JobStatus::Queued),
        "processing" => Ok(JobStatus::Running),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        "canceled" | "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(PipelineError::ParseError(format!("Unknown prediction status: {}", other))),
    }
}

/// `output` is a URL string or a list whose first entry is the URL.
fn output_url(output: Option<&Value>) -> Option<String> {
    match output? {
        Value::String(url) => Some(url.clone()),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn prediction_state(prediction: Prediction) -> Result<ProviderJobState> {
    let status = map_status(&prediction.status)?;
    let error = match prediction.error {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) => Some(message),
        Some(other) => Some(other.to_string()),
    };
    Ok(ProviderJobState {
        result_url: output_url(prediction.output.as_ref()),
        job_id: prediction.id,
        status,
        error,
    })
}

#[async_trait]
impl GenerationProvider for ReplicateProvider {
    async fn submit(&self, request: &GenerationRequest) -> Result<ProviderJobState> {
        let (url, body) = self.submit_target(self.input(request));
        debug!("Creating prediction at {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;
        self.prediction(response).await
    }

    async fn status(&self, job_id: &str) -> Result<ProviderJobState> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, job_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        self.prediction(response).await
    }

    async fn download(&self, result_url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(result_url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/predictions/{}/cancel", self.base_url, job_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(model: &str, image_field: Option<&str>) -> ReplicateProvider {
        let config = ProviderConfig {
            api_token: Some("r8_test".to_string()),
            model: model.to_string(),
            image_input_field: image_field.map(str::to_string),
            ..ProviderConfig::default()
        };
        ReplicateProvider::new(&config).unwrap()
    }

    fn prediction(value: Value) -> ProviderJobState {
        prediction_state(serde_json::from_value(value).unwrap()).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("starting").unwrap(), JobStatus::Queued);
        assert_eq!(map_status("processing").unwrap(), JobStatus::Running);
        assert_eq!(map_status("succeeded").unwrap(), JobStatus::Succeeded);
        assert_eq!(map_status("failed").unwrap(), JobStatus::Failed);
        assert_eq!(map_status("canceled").unwrap(), JobStatus::Cancelled);
        assert!(map_status("exploded").is_err());
    }

    #[test]
    fn test_output_string_or_first_array_entry() {
        let single = prediction(json!({
            "id": "p1", "status": "succeeded", "output": "https://replicate.delivery/out.mp4"
        }));
        assert_eq!(single.result_url.as_deref(), Some("https://replicate.delivery/out.mp4"));

        let list = prediction(json!({
            "id": "p2", "status": "succeeded",
            "output": ["https://replicate.delivery/a.mp4", "https://replicate.delivery/b.mp4"]
        }));
        assert_eq!(list.result_url.as_deref(), Some("https://replicate.delivery/a.mp4"));

        let pending = prediction(json!({ "id": "p3", "status": "starting", "output": null }));
        assert_eq!(pending.status, JobStatus::Queued);
        assert!(pending.result_url.is_none());
    }

    #[test]
    fn test_failed_prediction_keeps_error() {
        let failed = prediction(json!({ "id": "p4", "status": "failed", "error": "CUDA out of memory" }));
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("CUDA out of memory"));
    }

    #[test]
    fn test_submit_target_for_model_and_version() {
        let latest = provider("wan-video/wan-2.1-1.3b", None);
        let (url, body) = latest.submit_target(json!({ "prompt": "p" }));
        assert_eq!(url, "https://api.replicate.com/v1/models/wan-video/wan-2.1-1.3b/predictions");
        assert!(body.get("version").is_none());

        let pinned = provider("owner/model:abc123", None);
        let (url, body) = pinned.submit_target(json!({ "prompt": "p" }));
        assert_eq!(url, "https://api.replicate.com/v1/predictions");
        assert_eq!(body["version"], "abc123");
    }

    #[test]
    fn test_input_includes_negative_prompt_and_image_field() {
        let request = GenerationRequest {
            prompt: "Create a 5-second advertisement".to_string(),
            negative_prompt: Some("poor quality, blurry, low resolution".to_string()),
            reference_images: vec!["https://acme.example/hero.jpg".to_string()],
        };

        let plain = provider("wan-video/wan-2.1-1.3b", None).input(&request);
        assert_eq!(plain["negative_prompt"], "poor quality, blurry, low resolution");
        assert!(plain.get("image").is_none());

        let with_image = provider("wan-video/wan-2.1-14b-i2v", Some("image")).input(&request);
        assert_eq!(with_image["image"], "https://acme.example/hero.jpg");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        assert!(matches!(
            ReplicateProvider::new(&ProviderConfig::default()),
            Err(PipelineError::ConfigError(_))
        ));
    }
}
