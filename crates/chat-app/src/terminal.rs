use std::io::Write;

use nextstep_assist::llm::{BackendError, create_backend};
use nextstep_assist::{
    Message, MessageStatus, SendError, SendOutcome, SendResult, Sender, SessionUpdate,
    WidgetSession,
};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::settings::SettingsStore;

const ASSISTANT_NAME: &str = "NextStep AI";

const HELP_TEXT: &str = "\
commands:
  /open            open the chat widget
  /close           minimize it (the transcript is kept)
  /retry           resend the question that failed
  /dismiss         hide the error banner
  /1 /2 /3         pick a quick-reply suggestion
  /endpoint <url>  point the widget at another assistant service
  /help            show this list
  /quit            exit
anything else is sent as a question";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open,
    Close,
    Retry,
    Dismiss,
    /// Zero-based index into the visible suggestions.
    Suggestion(usize),
    Endpoint(String),
    Help,
    Quit,
    Ask(String),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Ask(trimmed.to_string());
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        match name {
            "open" => Self::Open,
            "close" => Self::Close,
            "retry" => Self::Retry,
            "dismiss" => Self::Dismiss,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "endpoint" if !argument.is_empty() => Self::Endpoint(argument.to_string()),
            _ => match name.parse::<usize>() {
                Ok(position) if position >= 1 => Self::Suggestion(position - 1),
                _ => Self::Unknown(trimmed.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TerminalError {
    #[snafu(display("failed to create assistant backend on `{stage}`: {source}"))]
    Backend {
        stage: &'static str,
        source: BackendError,
    },
    #[snafu(display("terminal i/o failed on `{stage}`: {source}"))]
    Io {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type TerminalResult<T> = Result<T, TerminalError>;

/// Line-oriented front end for a [`WidgetSession`].
///
/// Renders the transcript incrementally: finished messages are printed once, and the
/// reply being revealed is extended in place as characters arrive.
pub struct TerminalWidget<W: Write> {
    session: WidgetSession,
    settings: SettingsStore,
    out: W,
    /// Transcript entries printed in full.
    rendered: usize,
    /// Index and printed byte length of the message still being revealed.
    partial: Option<(usize, usize)>,
    loading_shown: bool,
}

impl<W: Write> TerminalWidget<W> {
    pub fn new(session: WidgetSession, settings: SettingsStore, out: W) -> Self {
        Self {
            session,
            settings,
            out,
            rendered: 0,
            partial: None,
            loading_shown: false,
        }
    }

    /// Builds the backend and session described by the stored settings.
    pub fn from_settings(settings: SettingsStore, out: W) -> TerminalResult<Self> {
        let current = settings.settings();
        let backend = create_backend(current.to_backend_config()).context(BackendSnafu {
            stage: "create-initial-backend",
        })?;
        let session = WidgetSession::new(backend, current.session_config());
        Ok(Self::new(session, settings, out))
    }

    pub fn session(&self) -> &WidgetSession {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Runs until `/quit` or end of input. At end of input, outstanding replies are
    /// still received and revealed before returning.
    pub async fn run<R>(&mut self, input: R) -> TerminalResult<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        writeln!(self.out, "type /open to start chatting, /help for commands")
            .context(IoSnafu { stage: "print-intro" })?;
        self.flush()?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line.context(IoSnafu { stage: "read-input-line" })?;
                    let Some(line) = line else {
                        self.drain().await?;
                        break;
                    };
                    if self.handle_line(&line)? == Flow::Quit {
                        break;
                    }
                }
                Some(update) = self.session.next_update() => {
                    self.render_update(&update)?;
                }
            }
        }

        tracing::debug!(
            messages = self.session.transcript().len(),
            "terminal session finished"
        );
        Ok(())
    }

    async fn drain(&mut self) -> TerminalResult<()> {
        while self.session.is_busy() {
            let Some(update) = self.session.next_update().await else {
                break;
            };
            self.render_update(&update)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> TerminalResult<Flow> {
        match Command::parse(line) {
            Command::Open => {
                self.session.open();
                self.sync()?;
            }
            Command::Close => {
                self.session.close();
                self.sync()?;
                self.loading_shown = false;
                self.say("[chat minimized]")?;
            }
            Command::Retry => {
                let outcome = self.session.retry();
                self.render_send(outcome)?;
            }
            Command::Dismiss => self.session.dismiss_banner(),
            Command::Suggestion(index) => {
                let outcome = self.session.choose_suggestion(index);
                self.render_send(outcome)?;
            }
            Command::Endpoint(url) => self.switch_endpoint(&url)?,
            Command::Help => self.say(HELP_TEXT)?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Ask(question) => {
                let outcome = self.session.send(&question);
                self.render_send(outcome)?;
            }
            Command::Unknown(raw) => self.say(&format!("unknown command `{raw}`, try /help"))?,
        }

        self.flush()?;
        Ok(Flow::Continue)
    }

    fn switch_endpoint(&mut self, url: &str) -> TerminalResult<()> {
        let updated = self
            .settings
            .settings()
            .as_ref()
            .clone()
            .with_base_url(url)
            .normalized();

        let backend = match create_backend(updated.to_backend_config()) {
            Ok(backend) => backend,
            Err(error) => {
                tracing::warn!(error = %error, base_url = %url, "endpoint rejected");
                return self.say(&format!("endpoint rejected: {error}"));
            }
        };

        if let Err(error) = self.settings.update(updated.clone()) {
            tracing::warn!(error = %error, "endpoint applied but settings were not saved");
        }

        self.session.replace_backend(backend);
        self.loading_shown = false;
        self.say(&format!("now talking to {}", updated.base_url))
    }

    fn render_send(&mut self, outcome: SendResult<SendOutcome>) -> TerminalResult<()> {
        match outcome {
            Ok(SendOutcome::Dispatched(_)) => self.sync(),
            Ok(SendOutcome::Queued) => self.say("(queued until the current reply finishes)"),
            Err(SendError::EmptyInput { .. }) => Ok(()),
            Err(SendError::WidgetClosed { .. }) => self.say("the chat is minimized, type /open"),
            Err(SendError::QueueFull { waiting, .. }) => {
                self.say(&format!("still waiting to send \"{waiting}\", one moment"))
            }
            Err(SendError::NothingToRetry { .. }) => self.say("nothing to retry"),
            Err(SendError::UnknownSuggestion { index, .. }) => {
                self.say(&format!("there is no suggestion {}", index + 1))
            }
        }
    }

    fn render_update(&mut self, update: &SessionUpdate) -> TerminalResult<()> {
        self.sync()?;

        match update {
            SessionUpdate::ReplyCompleted { .. } => self.render_suggestions()?,
            SessionUpdate::ExchangeFailed { .. } => self.render_banner()?,
            SessionUpdate::ReplyStarted { .. }
            | SessionUpdate::Revealed { .. }
            | SessionUpdate::Stale => {}
        }

        self.flush()
    }

    /// Prints whatever the transcript gained since the last call.
    fn sync(&mut self) -> TerminalResult<()> {
        let messages = self.session.transcript();

        if let Some((index, printed)) = self.partial.take() {
            if let Some(message) = messages.get(index) {
                let rest = message.text.get(printed..).unwrap_or_default();
                write!(self.out, "{rest}").context(IoSnafu { stage: "extend-reveal" })?;

                if message.is_in_flight() {
                    self.partial = Some((index, message.text.len()));
                    return Ok(());
                }
                end_line(&mut self.out, message)?;
            }
            self.rendered = index + 1;
        }

        while let Some(message) = messages.get(self.rendered) {
            if message.sender == Sender::Assistant && self.loading_shown {
                self.loading_shown = false;
            }

            write!(self.out, "{}: {}", speaker(message.sender), message.text)
                .context(IoSnafu { stage: "print-message" })?;

            if message.is_in_flight() {
                self.partial = Some((self.rendered, message.text.len()));
                return Ok(());
            }
            end_line(&mut self.out, message)?;
            self.rendered += 1;
        }

        if self.session.is_loading() && !self.loading_shown {
            writeln!(self.out, "  {ASSISTANT_NAME} is typing...")
                .context(IoSnafu { stage: "print-loading" })?;
            self.loading_shown = true;
        }
        Ok(())
    }

    fn render_suggestions(&mut self) -> TerminalResult<()> {
        let suggestions = self.session.suggestions();
        if suggestions.is_empty() {
            return Ok(());
        }

        let line = suggestions
            .iter()
            .enumerate()
            .map(|(index, suggestion)| format!("[/{}] {}", index + 1, suggestion.label))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(self.out, "  {line}").context(IoSnafu {
            stage: "print-suggestions",
        })
    }

    fn render_banner(&mut self) -> TerminalResult<()> {
        let Some(banner) = self.session.banner() else {
            return Ok(());
        };
        writeln!(self.out, "{} (/retry or /dismiss)", banner.notice())
            .context(IoSnafu { stage: "print-banner" })
    }

    fn say(&mut self, text: &str) -> TerminalResult<()> {
        writeln!(self.out, "{text}").context(IoSnafu { stage: "print-notice" })
    }

    fn flush(&mut self) -> TerminalResult<()> {
        self.out.flush().context(IoSnafu {
            stage: "flush-output",
        })
    }
}

fn speaker(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "You",
        Sender::Assistant => ASSISTANT_NAME,
    }
}

fn end_line(out: &mut impl Write, message: &Message) -> TerminalResult<()> {
    let marker = match message.status {
        MessageStatus::Interrupted => " ...",
        MessageStatus::Streaming | MessageStatus::Done => "",
    };
    writeln!(out, "{marker}").context(IoSnafu {
        stage: "finish-message-line",
    })
}
