//! Conversation engine
//!
//! Owns one session state machine per active channel and runs the
//! listen → transcribe → generate → synthesize → speak turn loop. A
//! demultiplexing dispatcher forwards channel events to the owning session
//! task by channel id; session logic never runs inline on the dispatch path.

pub mod engine;
pub mod session;

pub use engine::{CallAuthority, ConversationEngine, EngineConfig, Providers, SessionContext};
pub use session::{ConversationSession, SessionPhase};
