/// Wake-up and outcome contracts between the session and its background tasks.
pub mod events;
/// Request lifecycle: remote call, timeout and failure taxonomy.
pub mod exchange;
/// Transcript entities and the conversation store.
pub mod message;
pub mod reveal;
pub mod session;
pub mod suggestions;

pub use events::{SendOutcome, SessionUpdate};
pub use exchange::{
    AssistantUnavailable, DEFAULT_REQUEST_TIMEOUT, ExchangeFailure, UNAVAILABLE_NOTICE,
    clean_reply,
};
pub use message::{
    Conversation, ExchangeTicket, Message, MessageId, MessageStatus, RevealJobId, Sender,
};
pub use reveal::{DEFAULT_REVEAL_INTERVAL, RevealEngine, RevealProgress};
pub use session::{
    DEFAULT_GREETING, SendError, SendResult, SessionConfig, Visibility, WidgetSession,
    WidgetState,
};
pub use suggestions::{
    MAX_SUGGESTIONS, MIN_SUGGESTIONS, Suggestion, SuggestionRule, SuggestionTable,
    SuggestionTableError, SuggestionTableResult,
};
