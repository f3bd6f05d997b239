//! Provider factory
//!
//! Builds the configured set of provider backends from `Settings`.

use crate::generation::{ChatBackend, ChatConfig};
use crate::stt::{HttpStt, HttpSttConfig};
use crate::tts::{HttpTts, HttpTtsConfig};
use call_agent_config::ProviderSettings;
use call_agent_core::{ProviderError, ReplyGenerator, SpeechToText, TextToSpeech};
use std::sync::Arc;
use std::time::Duration;

/// The assembled provider backends handed to the conversation engine
#[derive(Clone)]
pub struct ProviderSet {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub generator: Arc<dyn ReplyGenerator>,
}

/// Build all three providers from configuration.
pub fn build_providers(settings: &ProviderSettings) -> Result<ProviderSet, ProviderError> {
    let stt = HttpStt::new(HttpSttConfig {
        url: settings.stt_url.clone(),
        language: settings.stt_language.clone(),
        timeout_ms: settings.timeout_ms,
        ..Default::default()
    })?;

    let tts = HttpTts::new(HttpTtsConfig {
        url: settings.tts_url.clone(),
        default_voice: None,
        timeout_ms: settings.timeout_ms,
    })?;

    let generator = ChatBackend::new(ChatConfig {
        endpoint: settings.generation.endpoint.clone(),
        api_key: settings.generation.api_key.clone(),
        model: settings.generation.model.clone(),
        max_tokens: settings.generation.max_tokens,
        temperature: settings.generation.temperature,
        timeout: Duration::from_millis(settings.timeout_ms),
    })?;

    tracing::info!(
        stt = %settings.stt_url,
        tts = %settings.tts_url,
        model = %settings.generation.model,
        "Providers initialized"
    );

    Ok(ProviderSet {
        stt: Arc::new(stt),
        tts: Arc::new(tts),
        generator: Arc::new(generator),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_from_default_settings() {
        let settings = ProviderSettings::default();
        let providers = build_providers(&settings).unwrap();
        assert_eq!(providers.stt.model_name(), "http-stt");
        assert_eq!(providers.tts.model_name(), "http-tts");
    }
}
