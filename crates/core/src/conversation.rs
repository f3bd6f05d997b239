//! Conversation turns and session outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Agent,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

/// One entry of a session's in-memory history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Agent, content)
    }
}

/// Why a conversation session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The caller signalled they were done (closing-intent phrase)
    UserEnded,
    /// The persona's turn cap was reached
    MaxTurns,
    /// The configured end digit was pressed
    DtmfInterrupt,
    /// The remote side hung up while the session was idle between operations
    RemoteHangup,
    /// The switch reported the channel gone mid-operation
    ChannelLost,
    /// Too many consecutive turn failures
    FailureBudget,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserEnded => "user_ended",
            Self::MaxTurns => "max_turns",
            Self::DtmfInterrupt => "dtmf_interrupt",
            Self::RemoteHangup => "remote_hangup",
            Self::ChannelLost => "channel_lost",
            Self::FailureBudget => "failure_budget",
        }
    }

    /// Whether the call should be recorded as completed rather than failed.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::UserEnded | Self::MaxTurns | Self::DtmfInterrupt | Self::RemoteHangup
        )
    }
}

/// Completion event emitted when a session tears down, consumed by the
/// orchestrator's finalization path.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub call_id: Uuid,
    pub channel_id: String,
    pub reason: EndReason,
    pub duration: Duration,
    pub turns: u32,
}

/// Fixed closing-intent phrases. Matching is case-insensitive and
/// substring-based so "...thank you so much..." counts.
const CLOSING_PHRASES: &[&str] = &[
    "bye",
    "goodbye",
    "thank you",
    "thanks",
    "not interested",
    "stop calling",
    "remove me from",
    "have a good day",
];

/// Detect end-of-conversation intent in a transcript. `extra` extends the
/// fixed set with persona-configured phrases.
pub fn is_closing_intent(text: &str, extra: &[String]) -> bool {
    let lowered = text.to_lowercase();
    CLOSING_PHRASES.iter().any(|p| lowered.contains(p))
        || extra.iter().any(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_intent_is_substring_and_case_insensitive() {
        assert!(is_closing_intent("Well, THANK YOU so much for the details", &[]));
        assert!(is_closing_intent("ok goodbye now", &[]));
        assert!(!is_closing_intent("tell me more about the offer", &[]));
    }

    #[test]
    fn test_closing_intent_honors_extra_keywords() {
        let extra = vec!["do not call".to_string()];
        assert!(is_closing_intent("please DO NOT CALL this number", &extra));
        assert!(!is_closing_intent("please call tomorrow", &extra));
    }

    #[test]
    fn test_end_reason_success_mapping() {
        assert!(EndReason::UserEnded.is_success());
        assert!(EndReason::MaxTurns.is_success());
        assert!(!EndReason::ChannelLost.is_success());
        assert!(!EndReason::FailureBudget.is_success());
    }

    #[test]
    fn test_turn_constructors() {
        let turn = Turn::user("hello");
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.content, "hello");
    }
}
