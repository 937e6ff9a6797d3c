use serde_json::Value;
use sqlx::Row;
use tracing::error;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{AuditEventRecord, AuditEventType};

fn is_sensitive_metadata_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("token") || key.contains("secret") || key.contains("password") || key.contains("authorization")
}

fn redact_metadata(metadata: Value) -> Value {
    match metadata {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive_metadata_key(&key) {
                        (key, Value::String("[REDACTED]".to_string()))
                    } else {
                        (key, value)
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

impl Store {
    pub async fn add_audit_event(
        &self,
        store_id: Option<&str>,
        event_type: AuditEventType,
        previous_status: Option<&str>,
        new_status: Option<&str>,
        message: &str,
        metadata: Value,
        ip_address: Option<&str>,
        user_email: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audit_logs
               (store_id, event_type, previous_status, new_status, message, metadata, ip_address, user_email)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(store_id)
        .bind(event_type.as_str())
        .bind(previous_status)
        .bind(new_status)
        .bind(message)
        .bind(redact_metadata(metadata))
        .bind(ip_address)
        .bind(user_email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Never raises: a failed audit write is logged and swallowed so it
    /// can never abort the orchestrator step that triggered it.
    pub async fn record_audit_event(
        &self,
        store_id: Option<&str>,
        event_type: AuditEventType,
        previous_status: Option<&str>,
        new_status: Option<&str>,
        message: &str,
        metadata: Value,
    ) {
        if let Err(err) = self
            .add_audit_event(store_id, event_type, previous_status, new_status, message, metadata, None, None)
            .await
        {
            error!(error = %err, store_id, event_type = event_type.as_str(), "failed to write audit event");
        }
    }

    pub async fn record_security_event(&self, message: &str, metadata: Value, ip_address: Option<&str>, user_email: Option<&str>) {
        if let Err(err) = self
            .add_audit_event(None, AuditEventType::Security, None, None, message, metadata, ip_address, user_email)
            .await
        {
            error!(error = %err, "failed to write security audit event");
        }
    }

    pub async fn list_audit_events(
        &self,
        store_id: Option<&str>,
        event_type: Option<&str>,
        owner_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditEventRecord>, i64), StoreError> {
        let rows = sqlx::query(
            "SELECT a.id, a.store_id, a.event_type, a.previous_status, a.new_status,
                    a.message, a.metadata, a.ip_address, a.user_email, a.created_at
             FROM audit_logs a
             LEFT JOIN stores s ON s.id = a.store_id
             WHERE ($1::text IS NULL OR a.store_id = $1)
               AND ($2::text IS NULL OR a.event_type = $2)
               AND ($3::uuid IS NULL OR s.owner_id = $3)
             ORDER BY a.created_at DESC, a.id DESC
             LIMIT $4 OFFSET $5",
        )
        .bind(store_id)
        .bind(event_type)
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_logs a
             LEFT JOIN stores s ON s.id = a.store_id
             WHERE ($1::text IS NULL OR a.store_id = $1)
               AND ($2::text IS NULL OR a.event_type = $2)
               AND ($3::uuid IS NULL OR s.owner_id = $3)",
        )
        .bind(store_id)
        .bind(event_type)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(AuditEventRecord {
                id: row.try_get("id")?,
                store_id: row.try_get("store_id")?,
                event_type: row.try_get("event_type")?,
                previous_status: row.try_get("previous_status")?,
                new_status: row.try_get("new_status")?,
                message: row.try_get("message")?,
                metadata: row.try_get("metadata")?,
                ip_address: row.try_get("ip_address")?,
                user_email: row.try_get("user_email")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok((items, total))
    }
}
