use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use snafu::Snafu;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub backend_id: String,
    pub base_url: String,
}

impl BackendConfig {
    pub fn new(backend_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into().trim().to_string(),
            base_url: base_url.into().trim().to_string(),
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type BackendResult<T> = Result<T, BackendError>;

/// Coarse failure classes a caller can act on.
///
/// Widgets render all of them the same way; the split exists for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Transport,
    Server,
    MalformedReply,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("backend '{backend_id}' is not supported"))]
    UnsupportedBackend {
        stage: &'static str,
        backend_id: String,
    },
    #[snafu(display("invalid backend base URL '{raw}': {details}"))]
    InvalidBaseUrl {
        stage: &'static str,
        raw: String,
        details: String,
    },
    #[snafu(display("failed to build http client on `{stage}`, {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request failed on `{stage}`, {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("no reply within {}ms", elapsed.as_millis()))]
    Timeout {
        stage: &'static str,
        elapsed: Duration,
    },
    #[snafu(display("backend returned status {status}: {body}"))]
    ServerStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("backend reply is malformed: {details}"))]
    MalformedReply {
        stage: &'static str,
        details: String,
    },
}

impl BackendError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedBackend { .. }
            | Self::InvalidBaseUrl { .. }
            | Self::BuildHttpClient { .. }
            | Self::Transport { .. }
            | Self::Timeout { .. } => FailureKind::Transport,
            Self::ServerStatus { .. } => FailureKind::Server,
            Self::MalformedReply { .. } => FailureKind::MalformedReply,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedBackend { stage, .. }
            | Self::InvalidBaseUrl { stage, .. }
            | Self::BuildHttpClient { stage, .. }
            | Self::Transport { stage, .. }
            | Self::Timeout { stage, .. }
            | Self::ServerStatus { stage, .. }
            | Self::MalformedReply { stage, .. } => stage,
        }
    }
}

/// A remote service that answers one question with one complete reply.
pub trait AssistantBackend: Send + Sync {
    fn id(&self) -> &str;
    fn ask<'a>(&'a self, question: &'a str) -> BoxFuture<'a, BackendResult<String>>;
}
