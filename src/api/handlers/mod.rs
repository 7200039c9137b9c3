//! API request handlers
use std::sync::Arc;

use crate::chat::ChatService;
use crate::config::AppConfig;
use crate::guard::AdmissionController;
use crate::guard::CredentialGate;

pub mod chat;

pub use chat::handle_chat;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub credentials: Arc<CredentialGate>,
    pub admission: Arc<AdmissionController>,
    pub cors_allowed_origin: Arc<str>,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &AppConfig, chat: Arc<ChatService>) -> Self {
        Self {
            chat,
            credentials: Arc::new(CredentialGate::from_config(config)),
            admission: Arc::new(AdmissionController::new(
                config.rate_limit.requests,
                config.rate_limit_window(),
            )),
            cors_allowed_origin: Arc::from(config.server.cors_allowed_origin.as_str()),
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// Health check handler
pub async fn health() -> &'static str {
    "ok"
}
