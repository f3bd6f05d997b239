//! ARI event and object models
//!
//! Events arrive as JSON objects discriminated by a `type` field. Only the
//! fields the client consumes are modeled; unknown event types deserialize to
//! `Unknown` and are ignored.

use call_agent_core::ChannelInfo;
use serde::Deserialize;

/// Caller identity on a channel
#[derive(Debug, Clone, Deserialize)]
pub struct Caller {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
}

/// Dialplan entry point the channel came from
#[derive(Debug, Clone, Deserialize)]
pub struct Dialplan {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub exten: String,
}

/// The switch's handle for one live audio leg
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    pub caller: Option<Caller>,
    pub dialplan: Option<Dialplan>,
}

impl Channel {
    /// Translate into the internal channel identity.
    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id.clone(),
            caller_number: self
                .caller
                .as_ref()
                .map(|c| c.number.clone())
                .filter(|n| !n.is_empty()),
            caller_name: self
                .caller
                .as_ref()
                .map(|c| c.name.clone())
                .filter(|n| !n.is_empty()),
            extension: self
                .dialplan
                .as_ref()
                .map(|d| d.exten.clone())
                .filter(|e| !e.is_empty()),
        }
    }
}

/// A playback operation on a channel or bridge
#[derive(Debug, Clone, Deserialize)]
pub struct Playback {
    pub id: String,
    #[serde(default)]
    pub media_uri: String,
    #[serde(default)]
    pub state: String,
}

/// A live or stored recording
#[derive(Debug, Clone, Deserialize)]
pub struct Recording {
    pub name: String,
    #[serde(default)]
    pub format: String,
    /// Seconds recorded, present on finished recordings
    pub duration: Option<i64>,
    /// Failure cause, present on failed recordings
    pub cause: Option<String>,
}

/// A mixing bridge
#[derive(Debug, Clone, Deserialize)]
pub struct Bridge {
    pub id: String,
}

/// Raw ARI events the client reacts to
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AriEvent {
    /// Channel entered the Stasis application
    StasisStart {
        channel: Channel,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Channel left the Stasis application
    StasisEnd { channel: Channel },
    ChannelStateChange { channel: Channel },
    ChannelDtmfReceived { channel: Channel, digit: String },
    PlaybackStarted { playback: Playback },
    PlaybackFinished { playback: Playback },
    RecordingStarted { recording: Recording },
    RecordingFinished { recording: Recording },
    RecordingFailed { recording: Recording },
    /// Anything else on the feed is irrelevant to call control
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stasis_start() {
        let json = r#"{
            "type": "StasisStart",
            "args": [],
            "channel": {
                "id": "1723900000.42",
                "name": "PJSIP/provider-00000001",
                "state": "Ring",
                "caller": {"name": "", "number": "+15550100"},
                "dialplan": {"context": "default", "exten": "100", "priority": 1}
            }
        }"#;

        let event: AriEvent = serde_json::from_str(json).unwrap();
        match event {
            AriEvent::StasisStart { channel, .. } => {
                assert_eq!(channel.id, "1723900000.42");
                let info = channel.info();
                assert_eq!(info.caller_number.as_deref(), Some("+15550100"));
                assert!(info.caller_name.is_none());
                assert_eq!(info.extension.as_deref(), Some("100"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_dtmf() {
        let json = r##"{
            "type": "ChannelDtmfReceived",
            "digit": "#",
            "duration_ms": 120,
            "channel": {"id": "1723900000.42", "state": "Up"}
        }"##;

        let event: AriEvent = serde_json::from_str(json).unwrap();
        match event {
            AriEvent::ChannelDtmfReceived { channel, digit } => {
                assert_eq!(channel.id, "1723900000.42");
                assert_eq!(digit, "#");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_recording_failed_carries_cause() {
        let json = r#"{
            "type": "RecordingFailed",
            "recording": {"name": "turn-3", "format": "wav", "cause": "hangup"}
        }"#;

        let event: AriEvent = serde_json::from_str(json).unwrap();
        match event {
            AriEvent::RecordingFailed { recording } => {
                assert_eq!(recording.name, "turn-3");
                assert_eq!(recording.cause.as_deref(), Some("hangup"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_types_are_tolerated() {
        let json = r#"{"type": "ChannelVarset", "variable": "X", "value": "1"}"#;
        let event: AriEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, AriEvent::Unknown));
    }
}
