use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::events::SessionEvent;
use super::message::{Conversation, MessageId, MessageStatus, RevealJobId, Sender};
use crate::task::TaskGuard;

/// Per-character interval of the simulated stream.
pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of starting or ticking a reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealProgress {
    Advanced {
        message_id: MessageId,
        revealed_chars: usize,
        total_chars: usize,
    },
    Completed {
        message_id: MessageId,
        full_text: String,
    },
    /// The tick or start did not apply to any live job.
    Stale,
}

struct RevealJob {
    id: RevealJobId,
    target: MessageId,
    full_text: String,
    total_chars: usize,
    revealed_chars: usize,
    /// Byte offset of the revealed prefix inside `full_text`.
    revealed_bytes: usize,
    _ticker: TaskGuard,
}

impl RevealJob {
    fn next_boundary(&self) -> usize {
        self.full_text[self.revealed_bytes..]
            .chars()
            .next()
            .map_or(self.revealed_bytes, |next| self.revealed_bytes + next.len_utf8())
    }
}

/// Reveals a fully known reply into its transcript message one character per tick.
///
/// Owns at most one job. The job's ticker task sends `RevealTick` wake-ups to the
/// session, and dropping the job (cancel, completion, or engine drop) aborts it.
pub struct RevealEngine {
    interval: Duration,
    events: mpsc::UnboundedSender<SessionEvent>,
    job: Option<RevealJob>,
    next_job_id: u64,
}

impl RevealEngine {
    pub(crate) fn new(interval: Duration, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            interval,
            events,
            job: None,
            next_job_id: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.job.is_some()
    }

    /// Starts revealing `full_text` into `target`, cancelling any running job first.
    ///
    /// The first character is shown immediately. An empty reply completes at once.
    pub(crate) fn start(
        &mut self,
        target: MessageId,
        full_text: String,
        conversation: &mut Conversation,
    ) -> RevealProgress {
        self.cancel(conversation);

        if full_text.is_empty() {
            let finished = conversation.replace_last(
                |message| is_target(message.sender, message.id, target),
                |message| message.status = MessageStatus::Done,
            );
            if !finished {
                return RevealProgress::Stale;
            }
            return RevealProgress::Completed {
                message_id: target,
                full_text,
            };
        }

        let id = RevealJobId::new(self.next_job_id);
        self.next_job_id = self.next_job_id.saturating_add(1);

        let mut job = RevealJob {
            id,
            target,
            total_chars: full_text.chars().count(),
            full_text,
            revealed_chars: 0,
            revealed_bytes: 0,
            _ticker: self.spawn_ticker(id),
        };

        if !Self::reveal_next(&mut job, conversation) {
            tracing::debug!(message_id = %target, "reveal target is not the trailing assistant message");
            return RevealProgress::Stale;
        }

        tracing::trace!(
            job = ?id,
            message_id = %target,
            total_chars = job.total_chars,
            "reveal started"
        );

        let progress = RevealProgress::Advanced {
            message_id: target,
            revealed_chars: job.revealed_chars,
            total_chars: job.total_chars,
        };
        self.job = Some(job);
        progress
    }

    /// Applies one tick. Ticks for a job other than the active one are stale.
    pub(crate) fn tick(
        &mut self,
        job_id: RevealJobId,
        conversation: &mut Conversation,
    ) -> RevealProgress {
        let Some(job) = self.job.as_mut().filter(|job| job.id == job_id) else {
            tracing::trace!(job = ?job_id, "dropping stale reveal tick");
            return RevealProgress::Stale;
        };

        if job.revealed_chars == job.total_chars {
            let target = job.target;
            conversation.replace_last(
                |message| is_target(message.sender, message.id, target),
                |message| message.status = MessageStatus::Done,
            );

            let Some(job) = self.job.take() else {
                return RevealProgress::Stale;
            };
            return RevealProgress::Completed {
                message_id: job.target,
                full_text: job.full_text,
            };
        }

        if !Self::reveal_next(job, conversation) {
            tracing::debug!(message_id = %job.target, "reveal target vanished; dropping job");
            self.job = None;
            return RevealProgress::Stale;
        }

        RevealProgress::Advanced {
            message_id: job.target,
            revealed_chars: job.revealed_chars,
            total_chars: job.total_chars,
        }
    }

    /// Stops the ticker and freezes the target at its revealed prefix.
    ///
    /// Returns whether a job was running.
    pub(crate) fn cancel(&mut self, conversation: &mut Conversation) -> bool {
        let Some(job) = self.job.take() else {
            return false;
        };

        conversation.replace_last(
            |message| is_target(message.sender, message.id, job.target),
            |message| message.status = MessageStatus::Interrupted,
        );
        tracing::debug!(
            job = ?job.id,
            message_id = %job.target,
            revealed_chars = job.revealed_chars,
            total_chars = job.total_chars,
            "reveal cancelled"
        );
        true
    }

    fn reveal_next(job: &mut RevealJob, conversation: &mut Conversation) -> bool {
        let next_boundary = job.next_boundary();
        let prefix = &job.full_text[..next_boundary];
        let target = job.target;

        let applied = conversation.replace_last(
            |message| is_target(message.sender, message.id, target),
            |message| {
                message.text.clear();
                message.text.push_str(prefix);
                message.status = MessageStatus::Streaming;
            },
        );

        if applied {
            job.revealed_bytes = next_boundary;
            job.revealed_chars += 1;
        }
        applied
    }

    fn spawn_ticker(&self, id: RevealJobId) -> TaskGuard {
        let events = self.events.clone();
        let period = self.interval;

        TaskGuard::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if events.send(SessionEvent::RevealTick(id)).is_err() {
                    break;
                }
            }
        })
    }
}

fn is_target(sender: Sender, id: MessageId, target: MessageId) -> bool {
    sender == Sender::Assistant && id == target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::Message;

    struct Harness {
        engine: RevealEngine,
        conversation: Conversation,
        ticks: mpsc::UnboundedReceiver<SessionEvent>,
    }

    impl Harness {
        fn new() -> Self {
            let (events, ticks) = mpsc::unbounded_channel();
            Self {
                engine: RevealEngine::new(DEFAULT_REVEAL_INTERVAL, events),
                conversation: Conversation::new(),
                ticks,
            }
        }

        fn append_placeholder(&mut self) -> MessageId {
            let message = Message::assistant_streaming();
            let id = message.id;
            self.conversation.append(message);
            id
        }

        fn last_text(&self) -> &str {
            self.conversation
                .last()
                .map_or("", |message| message.text.as_str())
        }

        async fn next_tick(&mut self) -> RevealProgress {
            match self.ticks.recv().await {
                Some(SessionEvent::RevealTick(job)) => {
                    self.engine.tick(job, &mut self.conversation)
                }
                other => panic!("expected reveal tick, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_every_prefix_then_completes() {
        let mut harness = Harness::new();
        let target = harness.append_placeholder();
        let mut observed = vec![harness.last_text().to_string()];

        let progress = harness
            .engine
            .start(target, "Hi there!".to_string(), &mut harness.conversation);
        assert!(matches!(progress, RevealProgress::Advanced { revealed_chars: 1, total_chars: 9, .. }));
        observed.push(harness.last_text().to_string());

        let full_text = loop {
            match harness.next_tick().await {
                RevealProgress::Advanced { .. } => observed.push(harness.last_text().to_string()),
                RevealProgress::Completed { full_text, .. } => break full_text,
                RevealProgress::Stale => panic!("live job produced a stale tick"),
            }
        };

        assert_eq!(full_text, "Hi there!");
        assert_eq!(observed.len(), "Hi there!".len() + 1);
        for (revealed, state) in observed.iter().enumerate() {
            assert_eq!(state, &"Hi there!"[..revealed]);
        }
        assert!(!harness.engine.is_active());
        assert_eq!(
            harness.conversation.last().map(|message| message.status),
            Some(MessageStatus::Done)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn multibyte_reply_reveals_whole_characters() {
        let mut harness = Harness::new();
        let target = harness.append_placeholder();
        harness
            .engine
            .start(target, "🚀é!".to_string(), &mut harness.conversation);
        assert_eq!(harness.last_text(), "🚀");

        assert!(matches!(harness.next_tick().await, RevealProgress::Advanced { revealed_chars: 2, .. }));
        assert_eq!(harness.last_text(), "🚀é");
        harness.next_tick().await;
        assert_eq!(harness.last_text(), "🚀é!");
        assert!(matches!(harness.next_tick().await, RevealProgress::Completed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_reply_completes_without_ticks() {
        let mut harness = Harness::new();
        let target = harness.append_placeholder();

        let progress = harness
            .engine
            .start(target, String::new(), &mut harness.conversation);
        assert_eq!(
            progress,
            RevealProgress::Completed {
                message_id: target,
                full_text: String::new(),
            }
        );
        assert!(!harness.engine.is_active());

        tokio::time::sleep(DEFAULT_REVEAL_INTERVAL * 5).await;
        assert!(harness.ticks.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_freezes_prefix_and_stops_ticks() {
        let mut harness = Harness::new();
        let target = harness.append_placeholder();
        harness
            .engine
            .start(target, "backend engineering".to_string(), &mut harness.conversation);
        harness.next_tick().await;
        harness.next_tick().await;

        assert!(harness.engine.cancel(&mut harness.conversation));
        assert!(!harness.engine.cancel(&mut harness.conversation));

        let frozen = harness.last_text().to_string();
        assert_eq!(frozen, "bac");
        assert_eq!(
            harness.conversation.last().map(|message| message.status),
            Some(MessageStatus::Interrupted)
        );

        tokio::time::sleep(DEFAULT_REVEAL_INTERVAL * 10).await;
        while let Ok(SessionEvent::RevealTick(job)) = harness.ticks.try_recv() {
            assert_eq!(
                harness.engine.tick(job, &mut harness.conversation),
                RevealProgress::Stale
            );
        }
        assert_eq!(harness.last_text(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_a_new_job_cancels_the_active_one() {
        let mut harness = Harness::new();
        let target = harness.append_placeholder();
        harness
            .engine
            .start(target, "first reply".to_string(), &mut harness.conversation);
        let first_job = harness.engine.job.as_ref().map(|job| job.id);
        harness.next_tick().await;
        assert_eq!(harness.last_text(), "fi");

        harness
            .engine
            .start(target, "second".to_string(), &mut harness.conversation);
        let second_job = harness.engine.job.as_ref().map(|job| job.id);

        assert_ne!(first_job, second_job);
        assert_eq!(harness.last_text(), "s");
        assert_eq!(
            harness.conversation.last().map(|message| message.status),
            Some(MessageStatus::Streaming)
        );

        if let Some(first_job) = first_job {
            assert_eq!(
                harness.engine.tick(first_job, &mut harness.conversation),
                RevealProgress::Stale
            );
        }
        assert_eq!(harness.last_text(), "s");
    }
}
