//! HTTP STT backend
//!
//! Sends a finished recording to a transcription sidecar service. The service
//! returns an empty transcript for silence; "no speech" is never an error.

use call_agent_core::{ProviderError, SpeechToText, Transcription};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// HTTP STT backend configuration
#[derive(Debug, Clone)]
pub struct HttpSttConfig {
    /// Base URL of the STT service
    pub url: String,
    /// Default language hint
    pub language: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Audio shorter than this is treated as silence without a request
    pub min_audio_bytes: usize,
}

impl Default for HttpSttConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090".to_string(),
            language: None,
            timeout_ms: 30000,
            min_audio_bytes: 3200, // ~100ms of 16kHz PCM16
        }
    }
}

/// Response from the STT service
#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP STT backend
pub struct HttpStt {
    config: HttpSttConfig,
    client: reqwest::Client,
}

impl HttpStt {
    pub fn new(config: HttpSttConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechToText for HttpStt {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcription, ProviderError> {
        if audio.len() < self.config.min_audio_bytes {
            return Ok(Transcription::default());
        }

        let url = format!("{}/transcribe", self.config.url.trim_end_matches('/'));
        let language = language
            .map(str::to_string)
            .or_else(|| self.config.language.clone());

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec());
        if let Some(ref lang) = language {
            request = request.header("X-Language", lang);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(format!("HTTP {}: {}", status, error_text)));
        }

        let result: SttResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = &result.error {
            tracing::warn!(error = %error, "STT service reported an error");
        }

        Ok(Transcription {
            text: result.text,
            confidence: result.confidence,
            language: result.language,
        })
    }

    fn model_name(&self) -> &str {
        "http-stt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpSttConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8090");
        assert_eq!(config.timeout_ms, 30000);
    }

    #[tokio::test]
    async fn test_short_audio_is_silence_without_request() {
        let stt = HttpStt::new(HttpSttConfig::default()).unwrap();
        // No server is running; this must short-circuit, not error
        let result = stt.transcribe(&[0u8; 16], None).await.unwrap();
        assert!(result.text.is_empty());
        assert_eq!(result.confidence, 0.0);
    }
}
