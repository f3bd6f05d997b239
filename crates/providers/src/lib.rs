//! HTTP provider backends
//!
//! One narrow, swappable HTTP client per capability: speech-to-text,
//! text-to-speech, reply generation. The factory assembles the set from
//! configuration; everything above them depends only on the core traits.

pub mod factory;
pub mod generation;
pub mod stt;
pub mod tts;

pub use factory::{build_providers, ProviderSet};
pub use generation::{ChatBackend, ChatConfig};
pub use stt::{HttpStt, HttpSttConfig};
pub use tts::{HttpTts, HttpTtsConfig};
