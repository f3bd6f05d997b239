//! Lead persistence using ScyllaDB

use crate::{PersistenceError, ScyllaClient};
use async_trait::async_trait;
use call_agent_core::{Lead, LeadStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lead store trait
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn create(&self, lead: &Lead) -> Result<(), PersistenceError>;
    async fn get(&self, id: Uuid) -> Result<Option<Lead>, PersistenceError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, PersistenceError>;
    async fn list_pending_consented(&self, limit: i32) -> Result<Vec<Lead>, PersistenceError>;
    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the lead store
#[derive(Clone)]
pub struct ScyllaLeadStore {
    client: ScyllaClient,
}

impl ScyllaLeadStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_lead(
        &self,
        row: scylla::frame::response::result::Row,
    ) -> Result<Lead, PersistenceError> {
        let (
            lead_id,
            name,
            phone,
            email,
            consent_given,
            consent_at,
            status,
            notes,
            created_at,
            updated_at,
        ): (
            Uuid,
            String,
            String,
            Option<String>,
            bool,
            Option<i64>,
            String,
            Option<String>,
            i64,
            i64,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(Lead {
            id: lead_id,
            name,
            phone,
            email,
            consent_given,
            consent_at: consent_at.and_then(DateTime::from_timestamp_millis),
            status: LeadStatus::from_str(&status),
            notes,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl LeadStore for ScyllaLeadStore {
    async fn create(&self, lead: &Lead) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.leads (
                lead_id, name, phone, email, consent_given, consent_at,
                status, notes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    lead.id,
                    &lead.name,
                    &lead.phone,
                    &lead.email,
                    lead.consent_given,
                    lead.consent_at.map(|t| t.timestamp_millis()),
                    lead.status.as_str(),
                    &lead.notes,
                    lead.created_at.timestamp_millis(),
                    lead.updated_at.timestamp_millis(),
                ),
            )
            .await?;

        let by_phone = format!(
            "INSERT INTO {}.leads_by_phone (phone, lead_id) VALUES (?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(by_phone, (&lead.phone, lead.id))
            .await?;

        tracing::info!(lead_id = %lead.id, phone = %lead.phone, "Lead created");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Lead>, PersistenceError> {
        let query = format!(
            "SELECT lead_id, name, phone, email, consent_given, consent_at,
                    status, notes, created_at, updated_at
             FROM {}.leads WHERE lead_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(self.row_to_lead(row)?));
            }
        }

        Ok(None)
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>, PersistenceError> {
        let query = format!(
            "SELECT lead_id FROM {}.leads_by_phone WHERE phone = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (phone,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (lead_id,): (Uuid,) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                return self.get(lead_id).await;
            }
        }

        Ok(None)
    }

    async fn list_pending_consented(&self, limit: i32) -> Result<Vec<Lead>, PersistenceError> {
        // Small table, admin-triggered path; filtering is acceptable here
        let query = format!(
            "SELECT lead_id, name, phone, email, consent_given, consent_at,
                    status, notes, created_at, updated_at
             FROM {}.leads WHERE consent_given = true AND status = 'new'
             LIMIT ? ALLOW FILTERING",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (limit,)).await?;

        let mut leads = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                leads.push(self.row_to_lead(row)?);
            }
        }

        Ok(leads)
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.leads SET status = ?, updated_at = ? WHERE lead_id = ?",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(query, (status.as_str(), Utc::now().timestamp_millis(), id))
            .await?;

        tracing::debug!(lead_id = %id, status = %status.as_str(), "Lead status updated");
        Ok(())
    }
}
