use std::sync::Arc;
use std::time::Duration;

use nextstep_llm::{AssistantBackend, BackendError, FailureKind};
use snafu::Snafu;
use tokio::sync::mpsc;

use super::events::SessionEvent;
use super::message::ExchangeTicket;
use crate::task::TaskGuard;

/// Bound on one remote call before it counts as a transport failure.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const UNAVAILABLE_NOTICE: &str = "⚠️ Failed to get response. Please try again.";

/// Why one exchange failed. Widgets render every variant as the same banner.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExchangeFailure {
    #[snafu(display("assistant unreachable on `{stage}`: {details}"))]
    TransportFailure {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("assistant returned status {status} on `{stage}`"))]
    ServerFailure {
        stage: &'static str,
        status: u16,
        details: String,
    },
    #[snafu(display("assistant reply is malformed on `{stage}`: {details}"))]
    MalformedReply {
        stage: &'static str,
        details: String,
    },
}

impl From<&BackendError> for ExchangeFailure {
    fn from(error: &BackendError) -> Self {
        let stage = error.stage();
        let details = error.to_string();

        match (error.failure_kind(), error) {
            (FailureKind::Server, BackendError::ServerStatus { status, .. }) => {
                Self::ServerFailure {
                    stage,
                    status: *status,
                    details,
                }
            }
            (FailureKind::MalformedReply, _) => Self::MalformedReply { stage, details },
            _ => Self::TransportFailure { stage, details },
        }
    }
}

/// The user-visible error banner for a failed exchange, with what Retry replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantUnavailable {
    pub question: String,
    pub failure: ExchangeFailure,
}

impl AssistantUnavailable {
    pub fn notice(&self) -> &'static str {
        UNAVAILABLE_NOTICE
    }
}

/// One in-flight remote call. Dropping it aborts the call.
pub(crate) struct PendingExchange {
    pub(crate) ticket: ExchangeTicket,
    pub(crate) question: String,
    _task: TaskGuard,
}

impl PendingExchange {
    /// Spawns the remote call; its outcome is delivered as `ReplyReady { ticket, .. }`.
    pub(crate) fn spawn(
        backend: Arc<dyn AssistantBackend>,
        ticket: ExchangeTicket,
        question: String,
        timeout: Duration,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let request_question = question.clone();

        let task = TaskGuard::spawn(async move {
            let outcome = tokio::time::timeout(timeout, backend.ask(&request_question)).await;
            let result = match outcome {
                Ok(Ok(answer)) => Ok(answer),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(BackendError::Timeout {
                    stage: "await-reply",
                    elapsed: timeout,
                }),
            };

            let result = result.map_err(|error| {
                tracing::warn!(
                    ticket = ?ticket,
                    backend_id = %backend.id(),
                    error = %error,
                    "assistant exchange failed"
                );
                ExchangeFailure::from(&error)
            });

            // The session may already be gone; nothing to deliver to then.
            let _ = events.send(SessionEvent::ReplyReady { ticket, result });
        });

        Self {
            ticket,
            question,
            _task: task,
        }
    }
}

/// Strips markdown emphasis markers and surrounding whitespace from a reply.
pub fn clean_reply(raw: &str) -> String {
    raw.replace('*', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_reply_strips_emphasis_and_whitespace() {
        assert_eq!(clean_reply("  **Backend** is *great*\n"), "Backend is great");
        assert_eq!(clean_reply("Hi there!"), "Hi there!");
        assert_eq!(clean_reply(" ** "), "");
    }

    #[test]
    fn backend_errors_collapse_onto_exchange_failures() {
        let server = BackendError::ServerStatus {
            stage: "chat-http-status",
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(matches!(
            ExchangeFailure::from(&server),
            ExchangeFailure::ServerFailure { status: 502, .. }
        ));

        let malformed = BackendError::MalformedReply {
            stage: "read-answer-field",
            details: "`answer` field is missing".to_string(),
        };
        assert!(matches!(
            ExchangeFailure::from(&malformed),
            ExchangeFailure::MalformedReply { stage: "read-answer-field", .. }
        ));

        let timeout = BackendError::Timeout {
            stage: "await-reply",
            elapsed: DEFAULT_REQUEST_TIMEOUT,
        };
        let failure = ExchangeFailure::from(&timeout);
        assert!(matches!(failure, ExchangeFailure::TransportFailure { stage: "await-reply", .. }));
        assert!(failure.to_string().contains("5000ms"));
    }
}
