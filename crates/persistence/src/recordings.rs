//! Recording metadata persistence using ScyllaDB

use crate::{PersistenceError, ScyllaClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of one stored turn recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMeta {
    pub call_id: Uuid,
    pub name: String,
    pub duration_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl RecordingMeta {
    pub fn new(call_id: Uuid, name: impl Into<String>, duration_secs: Option<u32>) -> Self {
        Self {
            call_id,
            name: name.into(),
            duration_secs,
            created_at: Utc::now(),
        }
    }
}

/// Recording metadata store trait
#[async_trait]
pub trait RecordingStore: Send + Sync {
    async fn insert(&self, meta: &RecordingMeta) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the recording store
#[derive(Clone)]
pub struct ScyllaRecordingStore {
    client: ScyllaClient,
}

impl ScyllaRecordingStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RecordingStore for ScyllaRecordingStore {
    async fn insert(&self, meta: &RecordingMeta) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.recordings (call_id, name, duration_secs, created_at)
             VALUES (?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    meta.call_id,
                    &meta.name,
                    meta.duration_secs.map(|d| d as i32),
                    meta.created_at.timestamp_millis(),
                ),
            )
            .await?;

        tracing::debug!(call_id = %meta.call_id, name = %meta.name, "Recording metadata stored");
        Ok(())
    }
}
