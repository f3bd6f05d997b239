//! Application state
//!
//! Shared state across all handlers: constructed dependencies, no global
//! singletons, so tests can assemble the same state over fakes.

use call_agent_core::CallControl;
use call_agent_engine::ConversationEngine;
use call_agent_orchestrator::CallOrchestrator;
use call_agent_persistence::LeadStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CallOrchestrator>,
    pub engine: Arc<ConversationEngine>,
    pub control: Arc<dyn CallControl>,
    pub leads: Arc<dyn LeadStore>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<CallOrchestrator>,
        engine: Arc<ConversationEngine>,
        control: Arc<dyn CallControl>,
        leads: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            orchestrator,
            engine,
            control,
            leads,
        }
    }
}
