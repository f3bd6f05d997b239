//! HTTP TTS backend
//!
//! Synthesizes agent utterances through a sidecar service and returns the
//! audio as buffered WAV bytes ready to be handed to the switch.

use call_agent_core::{ProviderError, TextToSpeech};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// HTTP TTS backend configuration
#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    /// Base URL of the TTS service
    pub url: String,
    /// Voice used when the persona does not specify one
    pub default_voice: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpTtsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8091".to_string(),
            default_voice: None,
            timeout_ms: 30000,
        }
    }
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
}

/// HTTP TTS backend
pub struct HttpTts {
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(config: HttpTtsConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextToSpeech for HttpTts {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/synthesize", self.config.url.trim_end_matches('/'));
        let voice_id = voice_id.or(self.config.default_voice.as_deref());

        let response = self
            .client
            .post(&url)
            .json(&TtsRequest { text, voice_id })
            .send()
            .await
            .map_err(|e| {
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "TTS service returned empty audio".to_string(),
            ));
        }

        Ok(bytes.to_vec())
    }

    fn model_name(&self) -> &str {
        "http-tts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = HttpTtsConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8091");
        assert!(config.default_voice.is_none());
    }

    #[test]
    fn test_request_skips_missing_voice() {
        let body = serde_json::to_string(&TtsRequest {
            text: "hello",
            voice_id: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"text":"hello"}"#);
    }
}
