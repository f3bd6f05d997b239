//! Core traits and types for the call agent
//!
//! This crate provides foundational types used across all other crates:
//! - Call lifecycle types (records, log entries, outcomes)
//! - Lead and persona domain types
//! - Conversation turns and end-of-conversation detection
//! - Traits for pluggable backends (telephony control, STT, TTS, reply
//!   generation)
//! - Error types

pub mod call;
pub mod conversation;
pub mod error;
pub mod lead;
pub mod persona;
pub mod traits;

pub use call::{CallLogEntry, CallRecord, CallStatus, Speaker};
pub use conversation::{is_closing_intent, EndReason, SessionOutcome, Turn, TurnRole};
pub use error::ProviderError;
pub use lead::{Lead, LeadStatus};
pub use persona::AgentPersona;

pub use traits::{
    CallControl, ChannelEvent, ChannelInfo, ConnectionState, OriginateParams, RecordingParams,
    ReplyGenerator, SpeechToText, StoredRecording, TelephonyError, TextToSpeech, Transcription,
};
