#![deny(unsafe_code)]

/// Client-side engine of the career assistant chat widget.
///
/// The session owns the transcript, reveals each reply character by character,
/// derives quick-reply suggestions, and recovers from failed exchanges.
pub mod chat;
mod task;

pub use chat::*;
pub use nextstep_llm as llm;
