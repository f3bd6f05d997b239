//! Persistence layer for the call agent
//!
//! The core only ever touches the datastore through the narrow store traits
//! defined here: read one lead, list pending consented leads, update lead
//! status, create/update call rows, append log rows, read the active persona,
//! write recording metadata. Two backends:
//! - ScyllaDB stores for production
//! - in-memory stores for development and tests

pub mod calls;
pub mod client;
pub mod error;
pub mod leads;
pub mod memory;
pub mod personas;
pub mod recordings;
pub mod schema;

pub use calls::{CallStore, ScyllaCallStore};
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use leads::{LeadStore, ScyllaLeadStore};
pub use memory::{InMemoryCallStore, InMemoryLeadStore, InMemoryPersonaStore, InMemoryRecordingStore};
pub use personas::{PersonaStore, ScyllaPersonaStore};
pub use recordings::{RecordingMeta, RecordingStore, ScyllaRecordingStore};

use std::sync::Arc;

/// Combined persistence layer with all stores
pub struct PersistenceLayer {
    pub leads: Arc<dyn LeadStore>,
    pub calls: Arc<dyn CallStore>,
    pub personas: Arc<dyn PersonaStore>,
    pub recordings: Arc<dyn RecordingStore>,
}

/// Initialize the ScyllaDB-backed persistence layer
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        leads: Arc::new(ScyllaLeadStore::new(client.clone())),
        calls: Arc::new(ScyllaCallStore::new(client.clone())),
        personas: Arc::new(ScyllaPersonaStore::new(client.clone())),
        recordings: Arc::new(ScyllaRecordingStore::new(client)),
    })
}

/// In-memory persistence layer for development and tests
pub fn init_in_memory() -> PersistenceLayer {
    PersistenceLayer {
        leads: Arc::new(InMemoryLeadStore::new()),
        calls: Arc::new(InMemoryCallStore::new()),
        personas: Arc::new(InMemoryPersonaStore::new()),
        recordings: Arc::new(InMemoryRecordingStore::new()),
    }
}
