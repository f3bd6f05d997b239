//! Per-call conversation session state
//!
//! In-memory only, owned exclusively by the engine, keyed by channel id.
//! A session is created the instant a channel enters the conversational
//! context and destroyed unconditionally when it leaves it; no session
//! outlives its channel.

use call_agent_core::{EndReason, SessionOutcome, Turn};
use std::time::Instant;
use uuid::Uuid;

/// Phase of the turn loop a session is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Greeting,
    Listening,
    Processing,
    Speaking,
    Ended,
}

/// State machine for one live conversation
#[derive(Debug)]
pub struct ConversationSession {
    pub call_id: Uuid,
    pub channel_id: String,
    pub history: Vec<Turn>,
    pub phase: SessionPhase,
    pub started: Instant,
    pub turns_taken: u32,
}

impl ConversationSession {
    pub fn new(call_id: Uuid, channel_id: impl Into<String>) -> Self {
        Self {
            call_id,
            channel_id: channel_id.into(),
            history: Vec::new(),
            phase: SessionPhase::Greeting,
            started: Instant::now(),
            turns_taken: 0,
        }
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        tracing::trace!(
            call_id = %self.call_id,
            channel_id = %self.channel_id,
            phase = ?phase,
            "Session phase change"
        );
        self.phase = phase;
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(Turn::user(content));
    }

    pub fn push_agent(&mut self, content: impl Into<String>) {
        self.history.push(Turn::agent(content));
    }

    /// Completion event for the orchestrator's finalization path.
    pub fn outcome(&self, reason: EndReason) -> SessionOutcome {
        SessionOutcome {
            call_id: self.call_id,
            channel_id: self.channel_id.clone(),
            reason,
            duration: self.started.elapsed(),
            turns: self.turns_taken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_agent_core::TurnRole;

    #[test]
    fn test_new_session_starts_in_greeting() {
        let session = ConversationSession::new(Uuid::new_v4(), "chan-1");
        assert_eq!(session.phase, SessionPhase::Greeting);
        assert_eq!(session.turns_taken, 0);
        assert!(session.history.is_empty());
    }

    #[test]
    fn test_history_roles() {
        let mut session = ConversationSession::new(Uuid::new_v4(), "chan-1");
        session.push_agent("hello");
        session.push_user("hi");
        assert_eq!(session.history[0].role, TurnRole::Agent);
        assert_eq!(session.history[1].role, TurnRole::User);
    }

    #[test]
    fn test_outcome_carries_turns_and_reason() {
        let mut session = ConversationSession::new(Uuid::new_v4(), "chan-1");
        session.turns_taken = 4;
        let outcome = session.outcome(EndReason::UserEnded);
        assert_eq!(outcome.turns, 4);
        assert_eq!(outcome.reason, EndReason::UserEnded);
        assert_eq!(outcome.channel_id, "chan-1");
    }
}
