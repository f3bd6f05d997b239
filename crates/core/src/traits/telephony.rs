//! Telephony control abstraction
//!
//! The protocol client implements `CallControl`; everything above it (engine,
//! orchestrator, tests) depends only on this trait plus the internal
//! `ChannelEvent` feed, so fakes can stand in for the switch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of one live audio leg as handed to the application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub caller_number: Option<String>,
    pub caller_name: Option<String>,
    /// Dialplan extension the channel entered the application from
    pub extension: Option<String>,
}

/// Internal events translated from the switch's raw protocol events
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Channel entered the application (StasisStart)
    Entered(ChannelInfo),
    /// Channel left the application (StasisEnd)
    Left { channel_id: String },
    /// In-band digit received
    Dtmf { channel_id: String, digit: char },
}

impl ChannelEvent {
    pub fn channel_id(&self) -> &str {
        match self {
            Self::Entered(info) => &info.id,
            Self::Left { channel_id } => channel_id,
            Self::Dtmf { channel_id, .. } => channel_id,
        }
    }
}

/// Control-connection health as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// Between reconnect attempts; `attempt` counts from 1
    Reconnecting { attempt: u32 },
    /// Attempt budget exhausted, no further reconnects
    Down,
}

/// Bounded recording request
#[derive(Debug, Clone)]
pub struct RecordingParams {
    pub name: String,
    pub format: String,
    pub max_duration_secs: u32,
    pub max_silence_secs: u32,
}

impl RecordingParams {
    pub fn bounded(name: impl Into<String>, max_duration_secs: u32, max_silence_secs: u32) -> Self {
        Self {
            name: name.into(),
            format: "wav".to_string(),
            max_duration_secs,
            max_silence_secs,
        }
    }
}

/// A recording the switch finished and stored
#[derive(Debug, Clone)]
pub struct StoredRecording {
    pub name: String,
    pub duration_secs: Option<u32>,
}

/// Outbound channel creation request
#[derive(Debug, Clone)]
pub struct OriginateParams {
    /// Dial endpoint, e.g. `PJSIP/+15550100@provider`
    pub endpoint: String,
    pub caller_id: Option<String>,
    pub timeout_secs: u32,
    pub app_args: Option<String>,
}

/// Telephony control errors
#[derive(Error, Debug)]
pub enum TelephonyError {
    /// The switch reports the channel already torn down. Terminal for that
    /// channel; callers must not retry the operation.
    #[error("Channel gone: {0}")]
    ChannelGone(String),

    #[error("Control connection is down")]
    Disconnected,

    #[error("Recording {name} failed: {cause}")]
    RecordingFailed { name: String, cause: String },

    #[error("Protocol API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Invalid protocol response: {0}")]
    InvalidResponse(String),
}

impl TelephonyError {
    /// Whether this error means the channel is finished and the session must
    /// tear down rather than continue.
    pub fn is_channel_gone(&self) -> bool {
        matches!(self, Self::ChannelGone(_))
    }
}

/// Imperative channel operations over the switch's control protocol.
///
/// Operations look synchronous to callers but are request/response over the
/// control channel; `play` and `record` only return once the switch reports
/// the playback/recording finished.
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn answer(&self, channel_id: &str) -> Result<(), TelephonyError>;

    async fn hangup(&self, channel_id: &str) -> Result<(), TelephonyError>;

    /// Play a media reference and wait for playback to finish.
    async fn play(&self, channel_id: &str, media_uri: &str) -> Result<(), TelephonyError>;

    /// Start a bounded recording and wait for it to finish or fail.
    async fn record(
        &self,
        channel_id: &str,
        params: &RecordingParams,
    ) -> Result<StoredRecording, TelephonyError>;

    /// Fetch a stored recording's bytes.
    async fn fetch_recording(&self, name: &str) -> Result<Vec<u8>, TelephonyError>;

    /// Delete a stored recording from the switch.
    async fn delete_recording(&self, name: &str) -> Result<(), TelephonyError>;

    /// Create a mixing bridge, returning its id.
    async fn create_bridge(&self) -> Result<String, TelephonyError>;

    /// Originate an outbound channel into the application, returning the
    /// channel id.
    async fn originate(&self, params: &OriginateParams) -> Result<String, TelephonyError>;

    fn connection_state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), ConnectionState::Connected)
    }
}
