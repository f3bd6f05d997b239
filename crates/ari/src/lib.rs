//! Asterisk REST Interface client
//!
//! Maintains the persistent control connection to the switch: a WebSocket
//! event stream registered as a named Stasis application, plus REST channel
//! operations. Raw ARI events are translated into the internal
//! [`ChannelEvent`](call_agent_core::ChannelEvent) feed; playback and
//! recording completions resolve pending operations so `play`/`record` look
//! synchronous to callers.

pub mod client;
pub mod connection;
pub mod events;

pub use client::AriClient;
pub use events::{AriEvent, Channel, Playback, Recording};
