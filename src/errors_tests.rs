//! Unit tests for error handling
//!
//! Tests error types, conversions, and error message formatting.

#[cfg(test)]
mod tests {
    use std::io;

    use crate::errors::RagChatError;
    use crate::guard::auth::AuthError;

    #[test]
    fn test_custom_error() {
        let error = RagChatError::Custom("Test error message".to_string());
        assert_eq!(format!("{error}"), "Test error message");
    }

    #[test]
    fn test_config_error() {
        let error = RagChatError::ConfigError("Invalid configuration".to_string());
        assert!(matches!(error, RagChatError::ConfigError(_)));
        assert!(format!("{error}").contains("configuration"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing chunks file");
        let error: RagChatError = io_error.into();
        assert!(matches!(error, RagChatError::Io(_)));
        assert!(format!("{error}").contains("missing chunks file"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let error: RagChatError = parse.unwrap_err().into();
        assert!(matches!(error, RagChatError::Serialization(_)));
    }

    #[test]
    fn test_auth_error_conversion() {
        let error: RagChatError = AuthError::Expired.into();
        assert!(matches!(error, RagChatError::Auth(AuthError::Expired)));
        assert_eq!(format!("{error}"), "Authentication error: token expired");
    }

    #[test]
    fn test_upstream_classification() {
        assert!(RagChatError::EmbeddingError("503".into()).is_upstream());
        assert!(RagChatError::LlmError("timeout".into()).is_upstream());
        assert!(RagChatError::HttpError("reset".into()).is_upstream());
        assert!(!RagChatError::InvalidModelOutput("not json".into()).is_upstream());
        assert!(!RagChatError::ConfigError("x".into()).is_upstream());
    }
}
