//! Agent persona persistence using ScyllaDB

use crate::{PersistenceError, ScyllaClient};
use async_trait::async_trait;
use call_agent_core::AgentPersona;
use uuid::Uuid;

/// Persona store trait
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// The currently active persona, if one is configured.
    async fn active(&self) -> Result<Option<AgentPersona>, PersistenceError>;
}

/// ScyllaDB implementation of the persona store
#[derive(Clone)]
pub struct ScyllaPersonaStore {
    client: ScyllaClient,
}

impl ScyllaPersonaStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PersonaStore for ScyllaPersonaStore {
    async fn active(&self) -> Result<Option<AgentPersona>, PersistenceError> {
        // Persona config is a handful of rows; filtering is acceptable here
        let query = format!(
            "SELECT persona_id, agent_name, company_name, greeting_template,
                    pitch_template, closing_template, positive_keywords_json,
                    negative_keywords_json, max_turns, recording_enabled,
                    analytics_enabled, active, voice_id
             FROM {}.agent_personas WHERE active = true LIMIT 1 ALLOW FILTERING",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, &[]).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (
                    persona_id,
                    agent_name,
                    company_name,
                    greeting_template,
                    pitch_template,
                    closing_template,
                    positive_keywords_json,
                    negative_keywords_json,
                    max_turns,
                    recording_enabled,
                    analytics_enabled,
                    active,
                    voice_id,
                ): (
                    Uuid,
                    String,
                    String,
                    String,
                    String,
                    String,
                    Option<String>,
                    Option<String>,
                    i32,
                    bool,
                    bool,
                    bool,
                    Option<String>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                let positive_keywords = positive_keywords_json
                    .as_deref()
                    .and_then(|j| serde_json::from_str(j).ok())
                    .unwrap_or_default();
                let negative_keywords = negative_keywords_json
                    .as_deref()
                    .and_then(|j| serde_json::from_str(j).ok())
                    .unwrap_or_default();

                return Ok(Some(AgentPersona {
                    id: Some(persona_id),
                    agent_name,
                    company_name,
                    greeting_template,
                    pitch_template,
                    closing_template,
                    positive_keywords,
                    negative_keywords,
                    max_turns: max_turns.max(1) as u32,
                    recording_enabled,
                    analytics_enabled,
                    active,
                    voice_id,
                }));
            }
        }

        Ok(None)
    }
}
