//! API request and response types

use serde::Deserialize;
use serde::Serialize;

use crate::models::SourceItem;

/// Body of `POST /chat`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub lang: Option<String>,
}

/// Body of a successful chat answer and of the SSE `result` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceItem>,
}

impl From<crate::models::ChatAnswer> for ChatResponse {
    fn from(answer: crate::models::ChatAnswer) -> Self {
        Self {
            answer: answer.answer,
            sources: answer.sources,
        }
    }
}

/// Payload of the SSE `delta` event
#[derive(Debug, Serialize, Deserialize)]
pub struct DeltaEvent {
    pub delta: String,
}

/// Payload of the SSE `error` event
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: String,
}
