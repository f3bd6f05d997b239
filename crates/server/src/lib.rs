//! HTTP trigger surface and process wiring
//!
//! The two external stimuli (new consented lead, switch-side call-status
//! notification) arrive here and invoke the orchestrator's entry points.
//! Delivery is at-least-once; the finalization path is idempotent, so
//! duplicate notifications for the same call id are harmless.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
