// EventBridge - publish/subscribe channel between sessions and the host
// Sessions publish typed events; transport adapters subscribe and forward them.

use tokio::sync::broadcast;
use tracing::trace;

use crate::hypothesis::{self, HypothesisKind};

/// Events buffered per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 256;

/// Notification emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Complete result at an utterance boundary
    Result(String),
    /// Running hypothesis inside an utterance
    PartialResult(String),
    /// Last result of a continuous session that was stopped
    FinalResult(String),
    /// Non-fatal runtime failure
    Error(String),
    /// A continuous session reached its time limit
    Timeout,
}

impl SessionEvent {
    /// Host event name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Result(_) => "onResult",
            SessionEvent::PartialResult(_) => "onPartialResult",
            SessionEvent::FinalResult(_) => "onFinalResult",
            SessionEvent::Error(_) => "onError",
            SessionEvent::Timeout => "onTimeout",
        }
    }

    /// Host event payload (`None` for `onTimeout`).
    pub fn payload(&self) -> Option<&str> {
        match self {
            SessionEvent::Result(text)
            | SessionEvent::PartialResult(text)
            | SessionEvent::FinalResult(text)
            | SessionEvent::Error(text) => Some(text),
            SessionEvent::Timeout => None,
        }
    }
}

/// Cloneable publisher handle; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBridge {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// New receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        trace!("Publishing {}", event.name());
        let _ = self.tx.send(event);
    }

    /// Decode an engine record and publish it, unless it holds no text.
    ///
    /// `event` picks the host event; `kind` picks the record field.
    /// Returns whether an event was published.
    pub fn publish_record(
        &self,
        kind: HypothesisKind,
        raw: &str,
        event: fn(String) -> SessionEvent,
    ) -> bool {
        match hypothesis::decode(raw, kind.field()) {
            Some(text) => {
                self.publish(event(text));
                true
            }
            None => false,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
