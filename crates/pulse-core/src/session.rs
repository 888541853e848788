//! Per-request session state.
//!
//! `SessionState` is the synchronous state machine driven by parsed events;
//! the async controller owns one per request and publishes `SessionView`
//! snapshots after every mutation.

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error_handling::FailureKind;
use crate::event::{ParsedEvent, ToolEventRecord};
use crate::reasoning::{ReasoningPhase, ReasoningPhaseDetector};
use crate::tool_tracker::ToolStatusTracker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionOutcome {
    Streaming,
    Completed,
    BackendError { message: String },
    TransportFailure { kind: FailureKind, message: String },
    Cancelled,
}

impl SessionOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionOutcome::Streaming)
    }

    /// Failures that should be shown to the user. Cancellation is not one.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SessionOutcome::BackendError { .. } | SessionOutcome::TransportFailure { .. }
        )
    }

    pub fn suggests_retry(&self) -> bool {
        match self {
            SessionOutcome::TransportFailure { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }
}

/// Immutable merged view handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub request_id: Uuid,
    pub text: String,
    pub reasoning: String,
    /// Running tools first, see [`ToolStatusTracker::snapshot`].
    pub tools: Vec<ToolEventRecord>,
    pub phase: ReasoningPhase,
    pub outcome: SessionOutcome,
    pub thread_id: Option<String>,
}

impl SessionView {
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

#[derive(Debug)]
pub struct SessionState {
    request_id: Uuid,
    text: String,
    reasoning: String,
    tools: ToolStatusTracker,
    phase: ReasoningPhaseDetector,
    outcome: SessionOutcome,
    thread_id: Option<String>,
}

impl SessionState {
    /// `thread_id` is the id the request was submitted with, if any.
    pub fn new(request_id: Uuid, thread_id: Option<String>) -> Self {
        Self {
            request_id,
            text: String::new(),
            reasoning: String::new(),
            tools: ToolStatusTracker::new(),
            phase: ReasoningPhaseDetector::new(),
            outcome: SessionOutcome::Streaming,
            thread_id,
        }
    }

    /// Apply one event. Returns whether the state changed; terminal sessions
    /// ignore everything.
    pub fn apply(&mut self, event: ParsedEvent) -> bool {
        if self.outcome.is_terminal() {
            debug!(request_id = %self.request_id, ?event, "Event after terminal state ignored");
            return false;
        }

        match event {
            ParsedEvent::TextDelta(delta) => {
                self.text.push_str(&delta);
            }
            ParsedEvent::ContentSnapshot { text, thread_id } => {
                self.text = text;
                if thread_id.is_some() {
                    self.thread_id = thread_id;
                }
            }
            ParsedEvent::ReasoningDelta { text, replace } => {
                if replace {
                    self.reasoning = text;
                } else {
                    self.reasoning.push_str(&text);
                }
                self.phase.update(&self.reasoning);
            }
            ParsedEvent::ToolEvent(record) => {
                self.tools.apply(record);
            }
            ParsedEvent::Done { thread_id } => {
                if thread_id.is_some() {
                    self.thread_id = thread_id;
                }
                info!(request_id = %self.request_id, thread_id = ?self.thread_id, "Session completed");
                self.outcome = SessionOutcome::Completed;
            }
            ParsedEvent::Error { message } => {
                info!(request_id = %self.request_id, %message, "Backend reported an error");
                self.outcome = SessionOutcome::BackendError { message };
            }
            ParsedEvent::Ignored => return false,
        }
        true
    }

    /// Mark the session cancelled. No-op once terminal.
    pub fn abort(&mut self) -> bool {
        if self.outcome.is_terminal() {
            return false;
        }
        self.outcome = SessionOutcome::Cancelled;
        true
    }

    pub fn fail_transport(&mut self, kind: FailureKind, message: impl Into<String>) -> bool {
        if self.outcome.is_terminal() {
            return false;
        }
        self.outcome = SessionOutcome::TransportFailure {
            kind,
            message: message.into(),
        };
        true
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            request_id: self.request_id,
            text: self.text.clone(),
            reasoning: self.reasoning.clone(),
            tools: self.tools.snapshot(),
            phase: self.phase.phase(),
            outcome: self.outcome.clone(),
            thread_id: self.thread_id.clone(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn phase(&self) -> ReasoningPhase {
        self.phase.phase()
    }

    pub fn outcome(&self) -> &SessionOutcome {
        &self.outcome
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ToolStatus;

    fn state() -> SessionState {
        SessionState::new(Uuid::new_v4(), None)
    }

    #[test]
    fn text_deltas_append_and_snapshots_replace() {
        let mut s = state();
        s.apply(ParsedEvent::TextDelta("Hello ".into()));
        s.apply(ParsedEvent::TextDelta("world".into()));
        assert_eq!(s.text(), "Hello world");

        s.apply(ParsedEvent::ContentSnapshot { text: "A".into(), thread_id: None });
        s.apply(ParsedEvent::ContentSnapshot { text: "AB".into(), thread_id: Some("t".into()) });
        assert_eq!(s.text(), "AB");
        assert_eq!(s.thread_id(), Some("t"));
    }

    #[test]
    fn reasoning_replace_and_append_drive_phase() {
        let mut s = state();
        s.apply(ParsedEvent::ReasoningDelta { text: "Audience: devs. ".into(), replace: false });
        assert_eq!(s.phase(), ReasoningPhase::ChainOfThought);
        s.apply(ParsedEvent::ReasoningDelta { text: "Searching news.".into(), replace: false });
        assert_eq!(s.reasoning(), "Audience: devs. Searching news.");
        assert_eq!(s.phase(), ReasoningPhase::ReactActing);

        s.apply(ParsedEvent::ReasoningDelta { text: "short".into(), replace: true });
        assert_eq!(s.reasoning(), "short");
        assert_eq!(s.phase(), ReasoningPhase::ReactActing);
    }

    #[test]
    fn terminal_state_is_frozen() {
        let mut s = state();
        assert!(s.apply(ParsedEvent::Done { thread_id: Some("abc".into()) }));
        assert_eq!(s.outcome(), &SessionOutcome::Completed);
        assert!(!s.apply(ParsedEvent::TextDelta("late".into())));
        assert!(!s.abort());
        assert!(!s.fail_transport(FailureKind::Network, "late"));
        assert_eq!(s.text(), "");
        assert_eq!(s.thread_id(), Some("abc"));
    }

    #[test]
    fn ignored_is_not_a_mutation() {
        let mut s = state();
        assert!(!s.apply(ParsedEvent::Ignored));
    }

    #[test]
    fn refine_thread_id_survives_done_without_id() {
        let mut s = SessionState::new(Uuid::new_v4(), Some("thread-1".into()));
        s.apply(ParsedEvent::Done { thread_id: None });
        assert_eq!(s.thread_id(), Some("thread-1"));
    }

    #[test]
    fn view_orders_tools() {
        let mut s = state();
        s.apply(ParsedEvent::ToolEvent(ToolEventRecord::new("a", ToolStatus::Completed)));
        s.apply(ParsedEvent::ToolEvent(ToolEventRecord::new("b", ToolStatus::Started)));
        let view = s.view();
        assert_eq!(view.tools[0].tool, "b");
        assert!(!view.is_terminal());
    }

    #[test]
    fn outcome_classification() {
        assert!(!SessionOutcome::Cancelled.is_failure());
        assert!(SessionOutcome::BackendError { message: "x".into() }.is_failure());
        assert!(SessionOutcome::TransportFailure {
            kind: FailureKind::Timeout,
            message: "idle".into()
        }
        .suggests_retry());
        assert!(!SessionOutcome::BackendError { message: "x".into() }.suggests_retry());
    }
}
