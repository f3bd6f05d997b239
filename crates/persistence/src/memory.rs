//! In-memory store implementations
//!
//! Back the development mode and the test suites. Call log ordering is
//! preserved by a plain Vec per call.

use crate::calls::CallStore;
use crate::leads::LeadStore;
use crate::personas::PersonaStore;
use crate::recordings::{RecordingMeta, RecordingStore};
use crate::PersistenceError;
use async_trait::async_trait;
use call_agent_core::{AgentPersona, CallLogEntry, CallRecord, Lead, LeadStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory lead store
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<Uuid, Lead>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn create(&self, lead: &Lead) -> Result<(), PersistenceError> {
        self.leads.write().insert(lead.id, lead.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Lead>, PersistenceError> {
        Ok(self.leads.read().get(&id).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, PersistenceError> {
        Ok(self
            .leads
            .read()
            .values()
            .find(|l| l.phone == phone)
            .cloned())
    }

    async fn list_pending_consented(&self, limit: i32) -> Result<Vec<Lead>, PersistenceError> {
        Ok(self
            .leads
            .read()
            .values()
            .filter(|l| l.consent_given && l.status == LeadStatus::New)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<(), PersistenceError> {
        let mut leads = self.leads.write();
        let lead = leads
            .get_mut(&id)
            .ok_or_else(|| PersistenceError::InvalidData(format!("unknown lead {}", id)))?;
        lead.status = status;
        lead.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory call store
#[derive(Default)]
pub struct InMemoryCallStore {
    calls: RwLock<HashMap<Uuid, CallRecord>>,
    log: RwLock<HashMap<Uuid, Vec<CallLogEntry>>>,
}

impl InMemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn all(&self) -> Vec<CallRecord> {
        self.calls.read().values().cloned().collect()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn create(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        self.calls.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        self.calls.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CallRecord>, PersistenceError> {
        Ok(self.calls.read().get(&id).cloned())
    }

    async fn append_log(&self, entry: &CallLogEntry) -> Result<(), PersistenceError> {
        self.log
            .write()
            .entry(entry.call_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_log(&self, call_id: Uuid) -> Result<Vec<CallLogEntry>, PersistenceError> {
        Ok(self.log.read().get(&call_id).cloned().unwrap_or_default())
    }
}

/// In-memory persona store
#[derive(Default)]
pub struct InMemoryPersonaStore {
    persona: RwLock<Option<AgentPersona>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persona(persona: AgentPersona) -> Self {
        Self {
            persona: RwLock::new(Some(persona)),
        }
    }

    pub fn set(&self, persona: Option<AgentPersona>) {
        *self.persona.write() = persona;
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn active(&self) -> Result<Option<AgentPersona>, PersistenceError> {
        Ok(self.persona.read().clone().filter(|p| p.active))
    }
}

/// In-memory recording metadata store
#[derive(Default)]
pub struct InMemoryRecordingStore {
    recordings: RwLock<Vec<RecordingMeta>>,
}

impl InMemoryRecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<RecordingMeta> {
        self.recordings.read().clone()
    }
}

#[async_trait]
impl RecordingStore for InMemoryRecordingStore {
    async fn insert(&self, meta: &RecordingMeta) -> Result<(), PersistenceError> {
        self.recordings.write().push(meta.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lead_round_trip() {
        let store = InMemoryLeadStore::new();
        let lead = Lead::new("Asha", "+15550100").with_consent();
        store.create(&lead).await.unwrap();

        let fetched = store.get(lead.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Asha");

        let by_phone = store.find_by_phone("+15550100").await.unwrap().unwrap();
        assert_eq!(by_phone.id, lead.id);

        store
            .update_status(lead.id, LeadStatus::Calling)
            .await
            .unwrap();
        let updated = store.get(lead.id).await.unwrap().unwrap();
        assert_eq!(updated.status, LeadStatus::Calling);
    }

    #[tokio::test]
    async fn test_pending_consented_filters_unconsented() {
        let store = InMemoryLeadStore::new();
        store
            .create(&Lead::new("With", "+1").with_consent())
            .await
            .unwrap();
        store.create(&Lead::new("Without", "+2")).await.unwrap();

        let pending = store.list_pending_consented(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "With");
    }

    #[tokio::test]
    async fn test_call_log_preserves_order() {
        use call_agent_core::Speaker;

        let store = InMemoryCallStore::new();
        let call_id = Uuid::new_v4();
        for i in 0..5 {
            store
                .append_log(&CallLogEntry::new(
                    call_id,
                    Speaker::Agent,
                    format!("turn {}", i),
                ))
                .await
                .unwrap();
        }

        let log = store.list_log(call_id).await.unwrap();
        let messages: Vec<_> = log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"]);
    }

    #[tokio::test]
    async fn test_inactive_persona_is_not_returned() {
        let mut persona = AgentPersona::default();
        persona.active = false;
        let store = InMemoryPersonaStore::with_persona(persona);
        assert!(store.active().await.unwrap().is_none());
    }
}
