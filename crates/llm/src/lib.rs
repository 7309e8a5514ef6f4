use std::sync::Arc;

mod http;
mod provider;

pub use http::{CHAT_PATH, GEMINI_CHAT_BACKEND_ID, HttpAssistant};
pub use provider::{
    AssistantBackend, BackendConfig, BackendError, BackendResult, BoxFuture, FailureKind,
};

pub fn create_backend(mut config: BackendConfig) -> BackendResult<Arc<dyn AssistantBackend>> {
    if config.backend_id.is_empty() {
        config.backend_id = GEMINI_CHAT_BACKEND_ID.to_string();
    }

    match config.backend_id.as_str() {
        "gemini-chat" | "http" => {
            config.backend_id = GEMINI_CHAT_BACKEND_ID.to_string();
            Ok(Arc::new(HttpAssistant::new(config)?))
        }
        _ => Err(BackendError::UnsupportedBackend {
            stage: "create-backend",
            backend_id: config.backend_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_backend_id_defaults_to_gemini_chat() {
        let backend = create_backend(BackendConfig::new("", "http://localhost:8000")).unwrap();
        assert_eq!(backend.id(), GEMINI_CHAT_BACKEND_ID);

        let backend = create_backend(BackendConfig::new("http", "http://localhost:8000")).unwrap();
        assert_eq!(backend.id(), GEMINI_CHAT_BACKEND_ID);
    }

    #[test]
    fn unknown_backend_id_is_rejected() {
        let error = create_backend(BackendConfig::new("carrier-pigeon", "http://localhost"))
            .err()
            .expect("unknown backend must fail");
        assert!(matches!(
            error,
            BackendError::UnsupportedBackend { ref backend_id, .. } if backend_id == "carrier-pigeon"
        ));
    }
}
