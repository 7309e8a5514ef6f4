use std::sync::Arc;
use std::time::Duration;

use nextstep_llm::AssistantBackend;
use snafu::{OptionExt, Snafu, ensure};
use tokio::sync::mpsc;

use super::events::{SendOutcome, SessionEvent, SessionUpdate};
use super::exchange::{
    AssistantUnavailable, DEFAULT_REQUEST_TIMEOUT, ExchangeFailure, PendingExchange, clean_reply,
};
use super::message::{Conversation, ExchangeTicket, Message, MessageId, RevealJobId, Sender};
use super::reveal::{DEFAULT_REVEAL_INTERVAL, RevealEngine, RevealProgress};
use super::suggestions::{Suggestion, SuggestionTable};

pub const DEFAULT_GREETING: &str =
    "👋 Hi! I'm NextStep AI. Ask me anything about tech careers, skills, and growth!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub greeting: String,
    pub reveal_interval: Duration,
    pub request_timeout: Duration,
    pub suggestions: SuggestionTable,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            reveal_interval: DEFAULT_REVEAL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            suggestions: SuggestionTable::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Closed,
    Open,
}

/// Top-level widget state. Errors are banners, never states of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetState {
    Closed,
    /// Open with nothing but the greeting so far.
    OpenEmpty,
    /// Open with at least one user question in the transcript.
    OpenActive,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SendError {
    #[snafu(display("question is empty after trimming"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("widget is closed"))]
    WidgetClosed { stage: &'static str },
    #[snafu(display("a question is already waiting for the active exchange"))]
    QueueFull {
        stage: &'static str,
        waiting: String,
    },
    #[snafu(display("no failed exchange to retry"))]
    NothingToRetry { stage: &'static str },
    #[snafu(display("no suggestion at position {index}"))]
    UnknownSuggestion { stage: &'static str, index: usize },
}

pub type SendResult<T> = Result<T, SendError>;

/// One widget instance: visibility, transcript, pending exchange, reveal and suggestions.
///
/// Everything runs on the caller's task. Background work (the remote call and the
/// reveal ticker) only posts wake-ups, which take effect in [`WidgetSession::next_update`].
/// Dropping the session aborts all of its background work.
pub struct WidgetSession {
    config: SessionConfig,
    backend: Arc<dyn AssistantBackend>,
    visibility: Visibility,
    greeted: bool,
    conversation: Conversation,
    reveal: RevealEngine,
    exchange: Option<PendingExchange>,
    queued: Option<String>,
    loading: bool,
    banner: Option<AssistantUnavailable>,
    suggestions: Vec<Suggestion>,
    next_ticket: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl WidgetSession {
    pub fn new(backend: Arc<dyn AssistantBackend>, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reveal = RevealEngine::new(config.reveal_interval, events_tx.clone());

        Self {
            config,
            backend,
            visibility: Visibility::Closed,
            greeted: false,
            conversation: Conversation::new(),
            reveal,
            exchange: None,
            queued: None,
            loading: false,
            banner: None,
            suggestions: Vec::new(),
            next_ticket: 1,
            events_tx,
            events_rx,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn state(&self) -> WidgetState {
        match self.visibility {
            Visibility::Closed => WidgetState::Closed,
            Visibility::Open if self.conversation.count_by(Sender::User) == 0 => {
                WidgetState::OpenEmpty
            }
            Visibility::Open => WidgetState::OpenActive,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    /// True while a remote call is awaited; reveal progress does not count.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn banner(&self) -> Option<&AssistantUnavailable> {
        self.banner.as_ref()
    }

    pub fn queued_question(&self) -> Option<&str> {
        self.queued.as_deref()
    }

    pub fn is_revealing(&self) -> bool {
        self.reveal.is_active()
    }

    /// True while an exchange or a reveal still has wake-ups to deliver.
    pub fn is_busy(&self) -> bool {
        self.exchange.is_some() || self.reveal.is_active()
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    /// Opens the widget. The greeting is seeded on the first open only.
    ///
    /// Returns true when this call seeded the greeting.
    pub fn open(&mut self) -> bool {
        self.visibility = Visibility::Open;
        if self.greeted {
            return false;
        }

        self.greeted = true;
        self.conversation
            .append(Message::assistant(self.config.greeting.clone()));
        tracing::debug!("widget opened for the first time; greeting seeded");
        true
    }

    /// Closes the widget, cancelling the reveal and any pending exchange.
    ///
    /// The transcript is kept; a partially revealed reply stays frozen at its prefix.
    pub fn close(&mut self) {
        if self.visibility == Visibility::Closed {
            return;
        }

        self.reveal.cancel(&mut self.conversation);
        self.banner = None;
        self.abandon_exchange("close");
        self.visibility = Visibility::Closed;
    }

    /// Submits a question.
    ///
    /// Dispatches immediately when idle, clearing any error banner. While an exchange
    /// or reveal is running the question waits in a single slot and is dispatched once
    /// that work settles; it never reaches the transcript if the slot is already taken
    /// (`QueueFull`) or the widget is closed or re-pointed before then.
    pub fn send(&mut self, text: &str) -> SendResult<SendOutcome> {
        let question = text.trim();
        ensure!(
            !question.is_empty(),
            EmptyInputSnafu {
                stage: "send-trim-input"
            }
        );
        ensure!(
            self.visibility == Visibility::Open,
            WidgetClosedSnafu {
                stage: "send-visibility"
            }
        );

        if !self.is_busy() {
            self.banner = None;
            let ticket = self.dispatch(question.to_string());
            return Ok(SendOutcome::Dispatched(ticket));
        }

        if let Some(waiting) = &self.queued {
            return QueueFullSnafu {
                stage: "send-enqueue",
                waiting: waiting.clone(),
            }
            .fail();
        }

        tracing::debug!(question_len = question.len(), "exchange active; question queued");
        self.queued = Some(question.to_string());
        Ok(SendOutcome::Queued)
    }

    /// Replays the question of the failed exchange shown in the banner.
    pub fn retry(&mut self) -> SendResult<SendOutcome> {
        let banner = self.banner.take().context(NothingToRetrySnafu {
            stage: "retry-take-banner",
        })?;

        match self.send(&banner.question) {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.banner = Some(banner);
                Err(error)
            }
        }
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Sends the label of the suggestion at `index` exactly like typed input.
    pub fn choose_suggestion(&mut self, index: usize) -> SendResult<SendOutcome> {
        let label = self
            .suggestions
            .get(index)
            .map(|suggestion| suggestion.label.clone())
            .context(UnknownSuggestionSnafu {
                stage: "choose-suggestion",
                index,
            })?;
        self.send(&label)
    }

    /// Swaps the remote backend. A pending exchange against the old one is abandoned.
    pub fn replace_backend(&mut self, backend: Arc<dyn AssistantBackend>) {
        self.abandon_exchange("replace-backend");
        tracing::info!(backend_id = %backend.id(), "assistant backend replaced");
        self.backend = backend;
    }

    /// Waits for the next background wake-up and applies it.
    ///
    /// Returns `None` only if the wake-up channel is closed, which cannot happen while
    /// the session is alive.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let event = self.events_rx.recv().await?;
        Some(self.apply_event(event))
    }

    /// Applies wake-ups until no exchange or reveal remains, returning every update.
    pub async fn settle(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while self.is_busy() {
            match self.next_update().await {
                Some(update) => updates.push(update),
                None => break,
            }
        }
        updates
    }

    fn apply_event(&mut self, event: SessionEvent) -> SessionUpdate {
        match event {
            SessionEvent::ReplyReady { ticket, result } => self.handle_reply(ticket, result),
            SessionEvent::RevealTick(job) => self.handle_reveal_tick(job),
        }
    }

    fn dispatch(&mut self, question: String) -> ExchangeTicket {
        let ticket = ExchangeTicket::new(self.next_ticket);
        self.next_ticket = self.next_ticket.saturating_add(1);

        self.conversation.append(Message::user(question.clone()));
        self.suggestions.clear();
        self.loading = true;

        tracing::debug!(
            ticket = ?ticket,
            backend_id = %self.backend.id(),
            "dispatching question"
        );

        self.exchange = Some(PendingExchange::spawn(
            Arc::clone(&self.backend),
            ticket,
            question,
            self.config.request_timeout,
            self.events_tx.clone(),
        ));
        ticket
    }

    fn handle_reply(
        &mut self,
        ticket: ExchangeTicket,
        result: Result<String, ExchangeFailure>,
    ) -> SessionUpdate {
        let Some(exchange) = self
            .exchange
            .take_if(|exchange| exchange.ticket == ticket)
        else {
            tracing::debug!(ticket = ?ticket, "discarding reply for an abandoned exchange");
            return SessionUpdate::Stale;
        };
        self.loading = false;

        match result {
            Ok(raw_reply) => {
                let reply = clean_reply(&raw_reply);
                let placeholder = Message::assistant_streaming();
                let message_id = placeholder.id;
                self.conversation.append(placeholder);

                tracing::info!(ticket = ?ticket, message_id = %message_id, "reply received");
                match self.reveal.start(message_id, reply, &mut self.conversation) {
                    RevealProgress::Advanced { total_chars, .. } => SessionUpdate::ReplyStarted {
                        message_id,
                        total_chars,
                    },
                    RevealProgress::Completed { full_text, .. } => {
                        self.finish_reply(message_id, &full_text)
                    }
                    RevealProgress::Stale => SessionUpdate::Stale,
                }
            }
            Err(failure) => {
                let question = exchange.question;
                self.banner = Some(AssistantUnavailable {
                    question: question.clone(),
                    failure,
                });
                self.drain_queue();
                SessionUpdate::ExchangeFailed { question }
            }
        }
    }

    fn handle_reveal_tick(&mut self, job: RevealJobId) -> SessionUpdate {
        match self.reveal.tick(job, &mut self.conversation) {
            RevealProgress::Advanced {
                message_id,
                revealed_chars,
                total_chars,
            } => SessionUpdate::Revealed {
                message_id,
                revealed_chars,
                total_chars,
            },
            RevealProgress::Completed {
                message_id,
                full_text,
            } => self.finish_reply(message_id, &full_text),
            RevealProgress::Stale => SessionUpdate::Stale,
        }
    }

    fn finish_reply(&mut self, message_id: MessageId, reply: &str) -> SessionUpdate {
        self.suggestions = self.config.suggestions.generate(reply);
        tracing::debug!(
            message_id = %message_id,
            category = %self.config.suggestions.category_for(reply),
            "reply fully revealed"
        );
        self.drain_queue();
        SessionUpdate::ReplyCompleted { message_id }
    }

    fn drain_queue(&mut self) {
        if self.is_busy() {
            return;
        }
        if let Some(question) = self.queued.take() {
            self.dispatch(question);
        }
    }

    fn abandon_exchange(&mut self, stage: &'static str) {
        if let Some(exchange) = self.exchange.take() {
            tracing::debug!(ticket = ?exchange.ticket, stage, "abandoning pending exchange");
        }
        self.queued = None;
        self.loading = false;
    }
}
