//! Call record and call log persistence using ScyllaDB

use crate::{PersistenceError, ScyllaClient};
use async_trait::async_trait;
use call_agent_core::{CallLogEntry, CallRecord, CallStatus, Speaker};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Call store trait
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn create(&self, record: &CallRecord) -> Result<(), PersistenceError>;
    async fn update(&self, record: &CallRecord) -> Result<(), PersistenceError>;
    async fn get(&self, id: Uuid) -> Result<Option<CallRecord>, PersistenceError>;
    async fn append_log(&self, entry: &CallLogEntry) -> Result<(), PersistenceError>;
    async fn list_log(&self, call_id: Uuid) -> Result<Vec<CallLogEntry>, PersistenceError>;
}

/// ScyllaDB implementation of the call store
#[derive(Clone)]
pub struct ScyllaCallStore {
    client: ScyllaClient,
}

impl ScyllaCallStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_record(
        &self,
        row: scylla::frame::response::result::Row,
    ) -> Result<CallRecord, PersistenceError> {
        let (
            call_id,
            lead_id,
            persona_id,
            status,
            channel_id,
            created_at,
            started_at,
            ended_at,
            duration_secs,
        ): (
            Uuid,
            Uuid,
            Option<Uuid>,
            String,
            Option<String>,
            i64,
            Option<i64>,
            Option<i64>,
            Option<i32>,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(CallRecord {
            id: call_id,
            lead_id,
            persona_id,
            status: CallStatus::from_str(&status),
            channel_id,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            started_at: started_at.and_then(DateTime::from_timestamp_millis),
            ended_at: ended_at.and_then(DateTime::from_timestamp_millis),
            duration_secs: duration_secs.map(|d| d as u32),
        })
    }
}

#[async_trait]
impl CallStore for ScyllaCallStore {
    async fn create(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.calls (
                call_id, lead_id, persona_id, status, channel_id,
                created_at, started_at, ended_at, duration_secs
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.id,
                    record.lead_id,
                    record.persona_id,
                    record.status.as_str(),
                    &record.channel_id,
                    record.created_at.timestamp_millis(),
                    record.started_at.map(|t| t.timestamp_millis()),
                    record.ended_at.map(|t| t.timestamp_millis()),
                    record.duration_secs.map(|d| d as i32),
                ),
            )
            .await?;

        tracing::info!(call_id = %record.id, lead_id = %record.lead_id, "Call record created");
        Ok(())
    }

    async fn update(&self, record: &CallRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.calls SET status = ?, channel_id = ?, started_at = ?,
                    ended_at = ?, duration_secs = ?
             WHERE call_id = ?",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.status.as_str(),
                    &record.channel_id,
                    record.started_at.map(|t| t.timestamp_millis()),
                    record.ended_at.map(|t| t.timestamp_millis()),
                    record.duration_secs.map(|d| d as i32),
                    record.id,
                ),
            )
            .await?;

        tracing::debug!(call_id = %record.id, status = %record.status.as_str(), "Call record updated");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CallRecord>, PersistenceError> {
        let query = format!(
            "SELECT call_id, lead_id, persona_id, status, channel_id,
                    created_at, started_at, ended_at, duration_secs
             FROM {}.calls WHERE call_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(self.row_to_record(row)?));
            }
        }

        Ok(None)
    }

    async fn append_log(&self, entry: &CallLogEntry) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.call_log (call_id, at, entry_id, speaker, message)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    entry.call_id,
                    entry.at.timestamp_millis(),
                    entry.id,
                    entry.speaker.as_str(),
                    &entry.message,
                ),
            )
            .await?;

        Ok(())
    }

    async fn list_log(&self, call_id: Uuid) -> Result<Vec<CallLogEntry>, PersistenceError> {
        let query = format!(
            "SELECT call_id, at, entry_id, speaker, message
             FROM {}.call_log WHERE call_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (call_id,))
            .await?;

        let mut entries = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (call_id, at, entry_id, speaker, message): (Uuid, i64, Uuid, String, String) =
                    row.into_typed()
                        .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                entries.push(CallLogEntry {
                    id: entry_id,
                    call_id,
                    speaker: Speaker::from_str(&speaker),
                    message,
                    at: DateTime::from_timestamp_millis(at).unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(entries)
    }
}
