//! Configuration for the call agent
//!
//! Layered loading: `config/default.toml`, then `config/{env}.toml`, then
//! `CALL_AGENT__`-prefixed environment variables.

pub mod settings;

pub use settings::{
    load_settings, AriSettings, CallingPolicy, ConversationSettings, GenerationSettings,
    MediaSettings, ObservabilitySettings, PersistenceSettings, ProviderSettings, ServerSettings,
    Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
