use super::exchange::ExchangeFailure;
use super::message::{ExchangeTicket, MessageId, RevealJobId};

/// Wake-ups delivered from background tasks back into the owning session.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    ReplyReady {
        ticket: ExchangeTicket,
        result: Result<String, ExchangeFailure>,
    },
    RevealTick(RevealJobId),
}

/// What one processed wake-up changed, for renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The reply arrived; an assistant message was appended and its first character shown.
    ReplyStarted {
        message_id: MessageId,
        total_chars: usize,
    },
    Revealed {
        message_id: MessageId,
        revealed_chars: usize,
        total_chars: usize,
    },
    /// Reveal finished and suggestions were recomputed.
    ReplyCompleted { message_id: MessageId },
    ExchangeFailed { question: String },
    /// The wake-up belonged to cancelled or superseded work and was dropped.
    Stale,
}

/// Accepted `send()` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Dispatched(ExchangeTicket),
    /// Parked in the single-slot queue until the active exchange settles.
    Queued,
}
