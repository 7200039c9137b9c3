use thiserror::Error;

use crate::guard::auth::AuthError;

#[derive(Error, Debug)]
pub enum RagChatError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// The model replied with something that is not the requested JSON shape.
    #[error("Invalid model output: {0}")]
    InvalidModelOutput(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Custom(String),
}

impl RagChatError {
    /// Errors caused by a remote provider rather than by local state.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::EmbeddingError(_) | Self::LlmError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagChatError>;
