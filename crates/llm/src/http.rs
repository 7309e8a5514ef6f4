use serde::Serialize;
use serde_json::Value;
use snafu::{ResultExt, ensure};

use super::provider::{
    AssistantBackend, BackendConfig, BackendError, BackendResult, BoxFuture,
    BuildHttpClientSnafu, InvalidBaseUrlSnafu, MalformedReplySnafu, ServerStatusSnafu,
    TransportSnafu,
};

pub const GEMINI_CHAT_BACKEND_ID: &str = "gemini-chat";
pub const CHAT_PATH: &str = "gemini-chat";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    question: &'a str,
}

/// Backend for the `POST /gemini-chat` proxy: `{ question }` in, `{ answer }` out.
pub struct HttpAssistant {
    config: BackendConfig,
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpAssistant {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        ensure!(
            !config.base_url.is_empty(),
            InvalidBaseUrlSnafu {
                stage: "http-assistant-new",
                raw: config.base_url.clone(),
                details: "base URL is empty".to_string(),
            }
        );

        let endpoint = Self::chat_endpoint(&config.base_url)?;
        let http = reqwest::Client::builder()
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-client",
            })?;

        Ok(Self {
            config,
            http,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    fn chat_endpoint(base_url: &str) -> BackendResult<reqwest::Url> {
        // A trailing slash makes `join` append instead of replacing the last path segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        reqwest::Url::parse(&normalized)
            .and_then(|base| base.join(CHAT_PATH))
            .map_err(|source| BackendError::InvalidBaseUrl {
                stage: "parse-chat-endpoint",
                raw: base_url.to_string(),
                details: source.to_string(),
            })
    }

    async fn post_question(&self, question: &str) -> BackendResult<String> {
        tracing::debug!(
            backend_id = %self.config.backend_id,
            endpoint = %self.endpoint,
            question_len = question.len(),
            "posting question"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&ChatRequest { question })
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-chat-request",
            })?;

        let status = response.status();
        let payload = response.text().await.context(TransportSnafu {
            stage: "read-chat-response",
        })?;

        if !status.is_success() {
            return ServerStatusSnafu {
                stage: "chat-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        Self::extract_answer(&payload)
    }

    fn extract_answer(payload: &str) -> BackendResult<String> {
        let value: Value =
            serde_json::from_str(payload).map_err(|source| BackendError::MalformedReply {
                stage: "parse-chat-response",
                details: source.to_string(),
            })?;

        match value.get("answer") {
            Some(Value::String(answer)) => Ok(answer.clone()),
            Some(other) => MalformedReplySnafu {
                stage: "read-answer-field",
                details: format!("`answer` is {} instead of a string", json_kind(other)),
            }
            .fail(),
            None => MalformedReplySnafu {
                stage: "read-answer-field",
                details: "`answer` field is missing".to_string(),
            }
            .fail(),
        }
    }
}

impl AssistantBackend for HttpAssistant {
    fn id(&self) -> &str {
        &self.config.backend_id
    }

    fn ask<'a>(&'a self, question: &'a str) -> BoxFuture<'a, BackendResult<String>> {
        Box::pin(self.post_question(question))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::provider::FailureKind;

    fn assistant_for(server: &MockServer) -> HttpAssistant {
        HttpAssistant::new(BackendConfig::new(GEMINI_CHAT_BACKEND_ID, server.uri()))
            .expect("mock server uri is a valid base url")
    }

    #[test]
    fn chat_endpoint_appends_path_to_base_with_prefix() {
        let endpoint = HttpAssistant::chat_endpoint("https://career.example.com/api/").unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://career.example.com/api/gemini-chat"
        );

        let endpoint = HttpAssistant::chat_endpoint("http://localhost:8000").unwrap();
        assert_eq!(endpoint.as_str(), "http://localhost:8000/gemini-chat");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let error = HttpAssistant::new(BackendConfig::new(GEMINI_CHAT_BACKEND_ID, "  "))
            .err()
            .expect("blank base url must fail");
        assert!(matches!(error, BackendError::InvalidBaseUrl { .. }));
    }

    #[tokio::test]
    async fn posts_question_and_returns_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gemini-chat"))
            .and(body_json(serde_json::json!({ "question": "Hello" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "answer": "Hi there!" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let answer = assistant_for(&server).ask("Hello").await.unwrap();
        assert_eq!(answer, "Hi there!");
    }

    #[tokio::test]
    async fn non_success_status_is_a_server_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gemini-chat"))
            .respond_with(ResponseTemplate::new(500).set_body_json(
                serde_json::json!({ "detail": "Failed to get Gemini response" }),
            ))
            .mount(&server)
            .await;

        let error = assistant_for(&server).ask("Hello").await.unwrap_err();
        assert!(matches!(error, BackendError::ServerStatus { status: 500, .. }));
        assert_eq!(error.failure_kind(), FailureKind::Server);
    }

    #[tokio::test]
    async fn non_string_answer_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gemini-chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "answer": 42 })),
            )
            .mount(&server)
            .await;

        let error = assistant_for(&server).ask("Hello").await.unwrap_err();
        assert_eq!(error.failure_kind(), FailureKind::MalformedReply);
        assert_eq!(error.stage(), "read-answer-field");
    }

    #[tokio::test]
    async fn missing_answer_and_non_json_bodies_are_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gemini-chat"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "reply": "hi" })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gemini-chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let assistant = assistant_for(&server);
        let missing = assistant.ask("Hello").await.unwrap_err();
        assert_eq!(missing.failure_kind(), FailureKind::MalformedReply);

        let not_json = assistant.ask("Hello").await.unwrap_err();
        assert_eq!(not_json.failure_kind(), FailureKind::MalformedReply);
        assert_eq!(not_json.stage(), "parse-chat-response");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        // Reserve a free port and release it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let assistant =
            HttpAssistant::new(BackendConfig::new(GEMINI_CHAT_BACKEND_ID, format!("http://{address}")))
                .unwrap();

        let error = assistant.ask("Hello").await.unwrap_err();
        assert_eq!(error.failure_kind(), FailureKind::Transport);
    }
}
