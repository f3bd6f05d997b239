//! Reply generation over an OpenAI-compatible chat API
//!
//! Works with OpenAI, vLLM and any local server exposing
//! `/chat/completions`. The conversation history plus the persona's system
//! prompt become the message list; the first choice's content is the reply.

use call_agent_core::{ProviderError, ReplyGenerator, Turn, TurnRole};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the chat completion backend
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// API endpoint base, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 128,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat backend
pub struct ChatBackend {
    config: ChatConfig,
    client: reqwest::Client,
}

impl ChatBackend {
    pub fn new(config: ChatConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() && !config.endpoint.starts_with("http://") {
            return Err(ProviderError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    fn convert_history(history: &[Turn], system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt.to_string(),
        });
        for turn in history {
            messages.push(ChatMessage {
                role: match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Agent => "assistant",
                    TurnRole::System => "system",
                },
                content: turn.content.clone(),
            });
        }
        messages
    }
}

#[async_trait]
impl ReplyGenerator for ChatBackend {
    async fn generate(
        &self,
        history: &[Turn],
        system_prompt: &str,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::convert_history(history, system_prompt),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(self.chat_url()).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| {
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

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        Ok(choice.message.content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_conversion_puts_system_first() {
        let history = vec![Turn::agent("hello"), Turn::user("hi")];
        let messages = ChatBackend::convert_history(&history, "you are a phone agent");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
    }

    #[test]
    fn test_local_endpoint_needs_no_api_key() {
        let backend = ChatBackend::new(ChatConfig::default());
        assert!(backend.is_ok());
    }
}
