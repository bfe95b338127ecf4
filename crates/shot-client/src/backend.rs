//! Inference backends
//!
//! The client sends a raw, already formatted prompt and expects the bare
//! completion back; chat templates would break the trained prompt layout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shot_schema::prompt::INPUT_HEADER;
use tracing::debug;

use crate::error::{ClientError, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sampling settings for one completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Sequences that end the completion
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            temperature: 0.1,
            max_tokens: 512,
            stop: vec![INPUT_HEADER.to_string()],
        }
    }
}

/// A server that completes raw prompts
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Complete `prompt` and return only the generated text.
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Whether the server answers at all.
    async fn is_available(&self) -> bool;
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("shot-client/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

async fn error_for_status(response: reqwest::Response, server: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Backend(format!(
        "{server} returned HTTP {}: {}",
        status.as_u16(),
        body.chars().take(200).collect::<String>()
    )))
}

/// Ollama `/api/generate` in raw mode
pub struct OllamaBackend {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    raw: bool,
    stream: bool,
    options: OllamaOptions<'a>,
}

#[derive(Serialize)]
struct OllamaOptions<'a> {
    temperature: f32,
    num_predict: u32,
    stop: &'a [String],
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(OllamaBackend {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http_client: http_client()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of models the server has.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let tags: OllamaTags = error_for_status(response, "ollama").await?.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = OllamaRequest {
            model: &self.model,
            prompt,
            raw: true,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                stop: &params.stop,
            },
        };
        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ClientError::Backend(format!(
                    "cannot reach ollama at {}: {e} (is `ollama serve` running?)",
                    self.base_url
                ))
            })?;
        let completion: OllamaResponse = error_for_status(response, "ollama").await?.json().await?;
        debug!(model = %self.model, chars = completion.response.len(), "Ollama completion");
        Ok(completion.response)
    }

    async fn is_available(&self) -> bool {
        self.http_client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

/// OpenAI-compatible `/v1/completions` server (vLLM, llama.cpp server, ...)
pub struct OpenAiCompatBackend {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stop: &'a [String],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(OpenAiCompatBackend {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            http_client: http_client()?,
        })
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stop: &params.stop,
        };
        let request = self
            .http_client
            .post(format!("{}/v1/completions", self.base_url))
            .json(&body);
        let response = self.authorize(request).send().await?;
        let completion: CompletionResponse =
            error_for_status(response, "completion server").await?.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| ClientError::Backend("completion response has no choices".to_string()))
    }

    async fn is_available(&self) -> bool {
        let request = self
            .http_client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(PROBE_TIMEOUT);
        self.authorize(request)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_request_is_raw_and_unstreamed() {
        let params = GenerationParams::default();
        let body = OllamaRequest {
            model: "camera-shot",
            prompt: "### 输入:\n推进\n\n### 输出:\n",
            raw: true,
            stream: false,
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                stop: &params.stop,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["raw"], true);
        assert_eq!(value["stream"], false);
        assert_eq!(value["options"]["num_predict"], 512);
        assert_eq!(value["options"]["stop"][0], "### 输入:");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/", "m").unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
    }
}
