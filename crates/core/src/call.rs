//! Call lifecycle types
//!
//! A `CallRecord` is created when a call is admitted and mutated only by the
//! orchestrator in response to lifecycle events. `CallLogEntry` rows are the
//! append-only transcript of a call; insertion order reconstructs the
//! conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Call lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Ringing => "ringing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ringing" => Self::Ringing,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Queued,
        }
    }

    /// Terminal states release the concurrency slot and freeze the record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Persistent record of one placed or received call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub persona_id: Option<Uuid>,
    pub status: CallStatus,
    /// Switch channel handle, known once the channel is originated/accepted
    pub channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the remote side answers
    pub started_at: Option<DateTime<Utc>>,
    /// Invariant: set if and only if `status` is terminal
    pub ended_at: Option<DateTime<Utc>>,
    /// Only meaningful once the record is terminal
    pub duration_secs: Option<u32>,
}

impl CallRecord {
    pub fn new(lead_id: Uuid, persona_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            persona_id,
            status: CallStatus::Queued,
            channel_id: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            duration_secs: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stamp answer time and move to `in_progress`.
    pub fn mark_answered(&mut self) {
        self.status = CallStatus::InProgress;
        self.started_at = Some(Utc::now());
    }

    /// Close the record. Sets `ended_at` together with the terminal status so
    /// the two can never disagree.
    pub fn finalize(&mut self, status: CallStatus, duration_secs: u32) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.duration_secs = Some(duration_secs);
    }
}

/// Who produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
    System,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "user" => Self::User,
            "agent" => Self::Agent,
            _ => Self::System,
        }
    }
}

/// One transcript or system event row for a call, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub id: Uuid,
    pub call_id: Uuid,
    pub speaker: Speaker,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl CallLogEntry {
    pub fn new(call_id: Uuid, speaker: Speaker, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_id,
            speaker,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_queued() {
        let record = CallRecord::new(Uuid::new_v4(), None);
        assert_eq!(record.status, CallStatus::Queued);
        assert!(record.ended_at.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_finalize_sets_ended_at_with_terminal_status() {
        let mut record = CallRecord::new(Uuid::new_v4(), None);
        record.mark_answered();
        assert_eq!(record.status, CallStatus::InProgress);
        assert!(record.started_at.is_some());
        assert!(record.ended_at.is_none());

        record.finalize(CallStatus::Completed, 42);
        assert!(record.is_terminal());
        assert!(record.ended_at.is_some());
        assert_eq!(record.duration_secs, Some(42));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            CallStatus::Queued,
            CallStatus::Ringing,
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Failed,
        ] {
            assert_eq!(CallStatus::from_str(status.as_str()), status);
        }
    }

    #[test]
    fn test_speaker_round_trip() {
        assert_eq!(Speaker::from_str("user"), Speaker::User);
        assert_eq!(Speaker::from_str("agent"), Speaker::Agent);
        assert_eq!(Speaker::from_str("system"), Speaker::System);
    }
}
