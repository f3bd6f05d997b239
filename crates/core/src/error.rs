//! Shared error types

use thiserror::Error;

/// Errors from the speech and generation providers
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider timeout")]
    Timeout,
}
