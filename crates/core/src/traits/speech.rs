//! Speech processing traits
//!
//! Implementations are narrow HTTP clients selected by configuration. Both
//! must be callable with no prior state, and "no speech detected" is an
//! empty/low-confidence result, never an error.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of transcribing one recording
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
    pub language: Option<String>,
}

impl Transcription {
    /// Empty or below-threshold transcriptions consume a turn without
    /// producing a user history entry.
    pub fn is_usable(&self, min_confidence: f32) -> bool {
        !self.text.trim().is_empty() && self.confidence >= min_confidence
    }
}

/// Speech-to-Text interface
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a complete recording.
    ///
    /// Returns an empty `Transcription` when no speech was detected.
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcription, ProviderError>;

    /// Backend name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize text into playable audio bytes (WAV).
    async fn synthesize(&self, text: &str, voice_id: Option<&str>)
        -> Result<Vec<u8>, ProviderError>;

    /// Backend name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_transcription() {
        let t = Transcription {
            text: "hello".to_string(),
            confidence: 0.9,
            language: None,
        };
        assert!(t.is_usable(0.3));
    }

    #[test]
    fn test_empty_and_low_confidence_are_unusable() {
        let empty = Transcription::default();
        assert!(!empty.is_usable(0.3));

        let mumble = Transcription {
            text: "uh".to_string(),
            confidence: 0.1,
            language: None,
        };
        assert!(!mumble.is_usable(0.3));
    }
}
