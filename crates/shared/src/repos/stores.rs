use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{AdminCredentials, Engine, StoreRecord, Theme};
use crate::state_machine::StoreStatus;

#[derive(Debug, Default, Clone)]
pub struct StoreFilter {
    pub owner_id: Option<Uuid>,
    pub status: Option<StoreStatus>,
    pub engine: Option<Engine>,
    pub include_deleted: bool,
}

#[derive(Debug, Default)]
pub struct UpdateStoreFields {
    pub status: Option<StoreStatus>,
    pub storefront_url: Option<String>,
    pub admin_url: Option<String>,
    pub admin_credentials: Option<AdminCredentials>,
    pub failure_reason: Option<String>,
    pub retry_count: Option<i32>,
    pub provisioning_started_at: Option<DateTime<Utc>>,
    pub provisioning_completed_at: Option<DateTime<Utc>>,
    pub provisioning_duration_ms: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn row_to_store(row: &sqlx::postgres::PgRow) -> Result<StoreRecord, StoreError> {
    let engine_raw: String = row.try_get("engine")?;
    let engine = Engine::from_str_loose(&engine_raw)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown engine persisted: {engine_raw}")))?;

    let theme_raw: Option<String> = row.try_get("theme")?;
    let theme = theme_raw
        .map(|raw| Theme::from_str_loose(&raw).ok_or_else(|| StoreError::InvalidData(format!("unknown theme persisted: {raw}"))))
        .transpose()?;

    let status_raw: String = row.try_get("status")?;
    let status = StoreStatus::from_db(&status_raw).map_err(StoreError::InvalidData)?;

    let credentials_raw: Option<serde_json::Value> = row.try_get("admin_credentials")?;
    let admin_credentials = credentials_raw
        .map(serde_json::from_value::<AdminCredentials>)
        .transpose()
        .map_err(|err| StoreError::InvalidData(format!("invalid admin_credentials json: {err}")))?;

    Ok(StoreRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        engine,
        theme,
        status,
        owner_id: row.try_get("owner_id")?,
        namespace: row.try_get("namespace")?,
        helm_release: row.try_get("helm_release")?,
        storefront_url: row.try_get("storefront_url")?,
        admin_url: row.try_get("admin_url")?,
        admin_credentials,
        failure_reason: row.try_get("failure_reason")?,
        retry_count: row.try_get("retry_count")?,
        provisioning_started_at: row.try_get("provisioning_started_at")?,
        provisioning_completed_at: row.try_get("provisioning_completed_at")?,
        provisioning_duration_ms: row.try_get("provisioning_duration_ms")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_store(
        &self,
        id: &str,
        name: &str,
        engine: Engine,
        theme: Option<Theme>,
        owner_id: Uuid,
        namespace: &str,
        helm_release: &str,
    ) -> Result<StoreRecord, StoreError> {
        let row = sqlx::query(
            "INSERT INTO stores (id, name, engine, theme, status, owner_id, namespace, helm_release)
             VALUES ($1, $2, $3, $4, 'REQUESTED', $5, $6, $7)
             RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(engine.as_str())
        .bind(theme.map(Theme::as_str))
        .bind(owner_id)
        .bind(namespace)
        .bind(helm_release)
        .fetch_one(&self.pool)
        .await?;

        row_to_store(&row)
    }

    pub async fn find_store_by_id(&self, id: &str) -> Result<Option<StoreRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM stores WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_store).transpose()
    }

    pub async fn find_store_by_name_and_owner(&self, name: &str, owner_id: Uuid) -> Result<Option<StoreRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM stores WHERE name = $1 AND owner_id = $2 AND status != 'DELETED'")
            .bind(name)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_store).transpose()
    }

    pub async fn list_stores(&self, filter: &StoreFilter, limit: i64, offset: i64) -> Result<Vec<StoreRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM stores
             WHERE ($1::uuid IS NULL OR owner_id = $1)
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR engine = $3)
               AND ($4 OR status != 'DELETED')
             ORDER BY created_at DESC
             LIMIT $5 OFFSET $6",
        )
        .bind(filter.owner_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.engine.map(Engine::as_str))
        .bind(filter.include_deleted)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_store).collect()
    }

    pub async fn count_active_stores_by_owner(&self, owner_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stores WHERE owner_id = $1 AND status NOT IN ('DELETED', 'FAILED')",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Feeds the `stores_total{status}` gauge (spec 4.16).
    pub async fn count_stores_by_status(&self) -> Result<Vec<(StoreStatus, i64)>, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM stores GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let status_raw: String = row.try_get("status")?;
                let count: i64 = row.try_get("count")?;
                let status = StoreStatus::from_db(&status_raw).map_err(StoreError::InvalidData)?;
                Ok((status, count))
            })
            .collect()
    }

    pub async fn find_stuck_stores(&self) -> Result<Vec<StoreRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM stores WHERE status IN ('REQUESTED', 'PROVISIONING', 'DELETING')")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_store).collect()
    }

    /// The critical operation: an atomic write conditional on
    /// `expected_status` when provided. No row back means a concurrent
    /// writer already moved the store out from under the caller.
    pub async fn update_store(
        &self,
        id: &str,
        fields: &UpdateStoreFields,
        expected_status: Option<StoreStatus>,
    ) -> Result<Option<StoreRecord>, StoreError> {
        let credentials_json = fields
            .admin_credentials
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| StoreError::InvalidData(format!("failed to serialize admin credentials: {err}")))?;

        let row = sqlx::query(
            "UPDATE stores SET
               status = COALESCE($2, status),
               storefront_url = COALESCE($3, storefront_url),
               admin_url = COALESCE($4, admin_url),
               admin_credentials = COALESCE($5, admin_credentials),
               failure_reason = COALESCE($6, failure_reason),
               retry_count = COALESCE($7, retry_count),
               provisioning_started_at = COALESCE($8, provisioning_started_at),
               provisioning_completed_at = COALESCE($9, provisioning_completed_at),
               provisioning_duration_ms = COALESCE($10, provisioning_duration_ms),
               deleted_at = COALESCE($11, deleted_at),
               updated_at = NOW()
             WHERE id = $1
               AND ($12::text IS NULL OR status = $12)
             RETURNING *",
        )
        .bind(id)
        .bind(fields.status.map(|s| s.as_str()))
        .bind(&fields.storefront_url)
        .bind(&fields.admin_url)
        .bind(credentials_json)
        .bind(&fields.failure_reason)
        .bind(fields.retry_count)
        .bind(fields.provisioning_started_at)
        .bind(fields.provisioning_completed_at)
        .bind(fields.provisioning_duration_ms)
        .bind(fields.deleted_at)
        .bind(expected_status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_store).transpose()
    }
}
