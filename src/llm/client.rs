//! Chat-completion client for OpenAI-compatible endpoints

use std::time::Duration;
use std::time::Instant;

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::RagChatError;
use crate::errors::Result;
use crate::llm::streaming::StreamingResponse;

/// Largest error body kept for error messages
const MAX_ERROR_BODY: usize = 2048;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

/// Client for JSON-mode chat completions
#[derive(Debug, Clone)]
pub struct LlmClient {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl LlmClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagChatError::HttpError(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            temperature,
            client,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        if config.llm.llm_key.trim().is_empty() {
            return Err(RagChatError::ConfigError(
                "LLM API key not provided (set llm.llm_key or OPENAI_API_KEY)".to_string(),
            ));
        }
        Self::new(
            &config.llm.llm_endpoint,
            &config.llm.llm_key,
            &config.llm.llm_model,
            config.llm.temperature,
            config.llm_timeout(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            stream,
        };
        let url = format!("{}/chat/completions", self.endpoint);
        debug!(
            "LLM request: model={} messages={} stream={}",
            self.model,
            messages.len(),
            stream
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagChatError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let mut body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            truncate_at_char(&mut body, MAX_ERROR_BODY);
            return Err(RagChatError::LlmError(format!(
                "chat completion http {status}: {body}"
            )));
        }
        Ok(response)
    }

    /// Run one blocking completion and return the assistant's raw content.
    pub async fn complete_json(&self, messages: &[ChatMessage]) -> Result<String> {
        let started = Instant::now();
        let response = self.send(messages, false).await?;
        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RagChatError::LlmError(format!("parse chat response: {e}")))?;
        debug!("LLM completion took {:?}", started.elapsed());

        if let Some(error) = parsed.error {
            return Err(RagChatError::LlmError(format!(
                "provider error: {} ({})",
                error.message, error.kind
            )));
        }
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RagChatError::LlmError("empty choices".to_string()))
    }

    /// Start a streamed completion. Dropping the returned stream aborts the request.
    pub async fn complete_json_stream(&self, messages: &[ChatMessage]) -> Result<StreamingResponse> {
        let response = self.send(messages, true).await?;
        Ok(StreamingResponse::from_sse_body(response.bytes_stream()))
    }
}

fn truncate_at_char(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
