//! OpenAI-compatible completions backend
//!
//! Drives one model server per device (vLLM, llama-server, Ollama, etc.)
//! through the raw-prompt `/completions` endpoint. The prompt is sent with
//! its chat template already applied.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{FinishReason, TextCompletionInput, TextCompletionOutput, TokenUsage};

use super::{BackendHealth, InferenceBackend};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for one OpenAI-compatible server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API base URL (e.g., "http://127.0.0.1:8000/v1")
    pub base_url: String,

    /// API key (empty string for local servers)
    pub api_key: String,

    /// Model name sent with every request
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/v1".to_string(),
            api_key: String::new(),
            model: "default".to_string(),
            timeout_secs: 180,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// OpenAI API types (request/response)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

// ─────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────

/// OpenAI-compatible completions backend bound to one device
pub struct OpenAiBackend {
    device_id: usize,
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiBackend {
    /// Create a backend for `device_id`
    pub fn new(device_id: usize, config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            device_id,
            base_url = %config.base_url,
            model = %config.model,
            "OpenAI-compatible backend created"
        );

        Ok(Self {
            device_id,
            config,
            client,
        })
    }

    /// Build the authorization header value (if API key is set)
    fn auth_header(&self) -> Option<String> {
        if self.config.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.config.api_key))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn device_error(&self, message: impl Into<String>) -> Error {
        Error::generation(self.device_id, message)
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn device_id(&self) -> usize {
        self.device_id
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        let start = Instant::now();
        let mut req = self.client.get(self.url("models"));
        if let Some(ref auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let health = match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                let model = resp
                    .json::<ModelList>()
                    .await
                    .ok()
                    .and_then(|list| list.data.into_iter().next())
                    .map(|m| m.id);
                BackendHealth {
                    operational: true,
                    model,
                    latency_ms: start.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Ok(resp) => BackendHealth::unhealthy(format!("API returned status {}", resp.status())),
            Err(e) => BackendHealth::unhealthy(format!("Connection failed: {}", e)),
        };
        Ok(health)
    }

    async fn text_completion(&self, input: TextCompletionInput) -> Result<TextCompletionOutput> {
        let start = Instant::now();
        let params = &input.params;

        let body = CompletionRequest {
            model: &self.config.model,
            prompt: &input.prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repetition_penalty: params.repetition_penalty,
            stop: if params.stop_sequences.is_empty() {
                None
            } else {
                Some(params.stop_sequences.as_slice())
            },
            seed: params.seed,
        };

        let mut req = self.client.post(self.url("completions")).json(&body);
        if let Some(ref auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let response = req
            .send()
            .await
            .map_err(|e| self.device_error(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.device_error(format!("API error {}: {}", status, text)));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| self.device_error(format!("Failed to parse API response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.device_error("No choices in API response"))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        debug!(
            device_id = self.device_id,
            completion_tokens = usage.completion_tokens,
            "Completion received"
        );

        Ok(TextCompletionOutput {
            text: choice.text,
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
            usage,
            generation_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
