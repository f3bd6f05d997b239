//! Traits for pluggable backends

pub mod generation;
pub mod speech;
pub mod telephony;

pub use generation::ReplyGenerator;
pub use speech::{SpeechToText, TextToSpeech, Transcription};
pub use telephony::{
    CallControl, ChannelEvent, ChannelInfo, ConnectionState, OriginateParams, RecordingParams,
    StoredRecording, TelephonyError,
};
