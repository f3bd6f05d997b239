//! Reply generation trait

use crate::conversation::Turn;
use crate::error::ProviderError;
use async_trait::async_trait;

/// Generates the agent's next reply from the conversation so far.
///
/// One interface, interchangeable backends selected by configuration.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Produce the next agent utterance given the history and the persona's
    /// system prompt.
    async fn generate(&self, history: &[Turn], system_prompt: &str)
        -> Result<String, ProviderError>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
