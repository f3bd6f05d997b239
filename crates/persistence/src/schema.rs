//! ScyllaDB schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Leads table
    let leads_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.leads (
            lead_id UUID,
            name TEXT,
            phone TEXT,
            email TEXT,
            consent_given BOOLEAN,
            consent_at BIGINT,
            status TEXT,
            notes TEXT,
            created_at BIGINT,
            updated_at BIGINT,
            PRIMARY KEY (lead_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(leads_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create leads table: {}", e)))?;

    // Phone lookup for inbound rings
    let leads_by_phone_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.leads_by_phone (
            phone TEXT,
            lead_id UUID,
            PRIMARY KEY (phone)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(leads_by_phone_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create leads_by_phone table: {}", e))
        })?;

    // Calls table
    let calls_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.calls (
            call_id UUID,
            lead_id UUID,
            persona_id UUID,
            status TEXT,
            channel_id TEXT,
            created_at BIGINT,
            started_at BIGINT,
            ended_at BIGINT,
            duration_secs INT,
            PRIMARY KEY (call_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(calls_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create calls table: {}", e)))?;

    // Call log: clustering on (at, entry_id) preserves transcript order
    let call_log_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_log (
            call_id UUID,
            at BIGINT,
            entry_id UUID,
            speaker TEXT,
            message TEXT,
            PRIMARY KEY ((call_id), at, entry_id)
        ) WITH CLUSTERING ORDER BY (at ASC, entry_id ASC)
    "#,
        keyspace
    );

    session
        .query_unpaged(call_log_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create call_log table: {}", e))
        })?;

    // Agent personas table
    let personas_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.agent_personas (
            persona_id UUID,
            agent_name TEXT,
            company_name TEXT,
            greeting_template TEXT,
            pitch_template TEXT,
            closing_template TEXT,
            positive_keywords_json TEXT,
            negative_keywords_json TEXT,
            max_turns INT,
            recording_enabled BOOLEAN,
            analytics_enabled BOOLEAN,
            active BOOLEAN,
            voice_id TEXT,
            PRIMARY KEY (persona_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(personas_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create agent_personas table: {}", e))
        })?;

    // Recording metadata table
    let recordings_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.recordings (
            call_id UUID,
            name TEXT,
            duration_secs INT,
            created_at BIGINT,
            PRIMARY KEY ((call_id), name)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(recordings_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create recordings table: {}", e))
        })?;

    tracing::info!("All tables created successfully");
    Ok(())
}
