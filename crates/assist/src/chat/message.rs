use std::fmt;
use std::time::SystemTime;

use uuid::Uuid;

/// Opaque identifier for one transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Allocates a time-ordered identifier.
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Identifier for one request/response exchange.
///
/// A fresh ticket is issued per dispatch so late replies can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeTicket(pub u64);

impl ExchangeTicket {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifier for one reveal job; tick events carry it for stale-tick rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevealJobId(pub u64);

impl RevealJobId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Assistant,
}

/// Render status for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Text is still growing under a reveal job.
    Streaming,
    Done,
    /// Reveal was cancelled; text is frozen at a prefix of the reply.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub status: MessageStatus,
    pub created_at: SystemTime,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: MessageId::new_v7(),
            sender,
            text: text.into(),
            status,
            created_at: SystemTime::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, MessageStatus::Done)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text, MessageStatus::Done)
    }

    /// Creates the empty assistant placeholder a reveal job writes into.
    pub fn assistant_streaming() -> Self {
        Self::new(Sender::Assistant, String::new(), MessageStatus::Streaming)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, MessageStatus::Streaming)
    }
}

/// Ordered transcript; insertion order is display order.
///
/// At most one message is in flight, and only as the trailing assistant message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends at the end. Never reorders and never deduplicates.
    pub fn append(&mut self, message: Message) {
        debug_assert!(
            !self.messages.last().is_some_and(Message::is_in_flight),
            "append while the trailing message is still in flight"
        );
        self.messages.push(message);
    }

    /// Mutates the trailing message if it satisfies `predicate`.
    ///
    /// Returns false and leaves the transcript untouched otherwise.
    pub fn replace_last<P, U>(&mut self, predicate: P, updater: U) -> bool
    where
        P: FnOnce(&Message) -> bool,
        U: FnOnce(&mut Message),
    {
        match self.messages.last_mut() {
            Some(last) if predicate(last) => {
                updater(last);
                true
            }
            _ => false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn in_flight(&self) -> Option<&Message> {
        self.messages.last().filter(|message| message.is_in_flight())
    }

    pub fn count_by(&self, sender: Sender) -> usize {
        self.messages
            .iter()
            .filter(|message| message.sender == sender)
            .count()
    }
}
