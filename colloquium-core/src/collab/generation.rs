//! OpenAI-compatible generation backend.
//!
//! Works against OpenAI, Azure OpenAI, Ollama, vLLM, and any endpoint that
//! follows the chat completions API format. Each debate step supplies a
//! role prompt (sent as the system message) and its working context (sent
//! as the user message).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use super::GenerationBackend;
use crate::config::GenerationConfig;
use crate::error::GenerationError;

pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiCompatBackend {
    /// Create a new backend from configuration.
    ///
    /// The API key comes from `config.api_key`, then the environment
    /// variable named by `config.api_key_env`. Local endpoints (Ollama,
    /// vLLM, LM Studio) do not require a key.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let is_local =
            config.base_url.contains("localhost") || config.base_url.contains("127.0.0.1");

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| {
                if is_local {
                    debug!("no API key set for local backend, using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| GenerationError::AuthFailed {
                backend: format!(
                    "openai-compatible: env var '{}' not set",
                    config.api_key_env
                ),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn request_body(&self, prompt: &str, context: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt },
                { "role": "user", "content": context },
            ],
            "temperature": self.temperature,
            "stream": stream,
        })
    }

    /// Extract the assistant text from a chat completions body.
    fn parse_response(body: &Value) -> Result<String, GenerationError> {
        let content = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "no assistant content in response".to_string(),
            })?;
        Ok(content.to_string())
    }

    /// Parse a single SSE data line. Returns the parsed JSON if valid.
    fn parse_sse_line(line: &str) -> Option<Value> {
        let data = line.strip_prefix("data: ")?;
        if data == "[DONE]" {
            return None;
        }
        serde_json::from_str(data).ok()
    }

    fn map_send_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            GenerationError::Connection {
                message: err.to_string(),
            }
        }
    }

    /// Map an HTTP status code to the appropriate GenerationError.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> GenerationError {
        match status.as_u16() {
            401 => {
                debug!(body = %body, "authentication failed (401)");
                GenerationError::AuthFailed {
                    backend: "openai-compatible".to_string(),
                }
            }
            code => GenerationError::Http {
                status: code,
                message: body.to_string(),
            },
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &str,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, context, false))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Connection {
                message: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body));
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|e| GenerationError::ResponseParse {
                message: format!("invalid JSON: {e}"),
            })?;

        Self::parse_response(&json)
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        context: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "sending streaming completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, context, true))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body));
        }

        let full_body = response
            .text()
            .await
            .map_err(|e| GenerationError::Connection {
                message: format!("failed to read stream: {e}"),
            })?;

        let mut full = String::new();
        for line in full_body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if line == "data: [DONE]" {
                break;
            }
            if let Some(data) = Self::parse_sse_line(line)
                && let Some(content) = data
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|choice| choice.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(|c| c.as_str())
                && !content.is_empty()
            {
                full.push_str(content);
                let _ = tx.send(content.to_string()).await;
            }
        }

        // Some gateways ignore `stream: true` and reply with a plain
        // completion body.
        if full.is_empty()
            && let Ok(json) = serde_json::from_str::<Value>(&full_body)
        {
            let text = Self::parse_response(&json)?;
            let _ = tx.send(text.clone()).await;
            return Ok(text);
        }

        Ok(full)
    }
}
