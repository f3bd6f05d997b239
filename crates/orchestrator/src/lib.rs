//! Call orchestrator
//!
//! The admission and lifecycle authority: decides whether a call may be
//! placed now (calling-hours window, concurrency ceiling, switch
//! connectivity), owns the call-record lifecycle and the active-call table,
//! and resolves the agent persona with a short-TTL cache.

pub mod orchestrator;
pub mod persona_cache;

pub use orchestrator::{
    ActiveCallSummary, Admission, CallOrchestrator, CallOutcome, CallStatusReport, DeferReason,
    LiveCallState, OrchestratorError,
};
pub use persona_cache::PersonaCache;
