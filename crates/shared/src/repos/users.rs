use sqlx::Row;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{Role, UserRecord};

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<UserRecord, StoreError> {
    let role_raw: String = row.try_get("role")?;
    Ok(UserRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::from_db(&role_raw),
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Store {
    pub async fn count_users(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// The first account ever registered is promoted to admin.
    pub async fn create_user(&self, email: &str, username: &str, password_hash: &str) -> Result<UserRecord, StoreError> {
        let normalized_email = email.trim().to_ascii_lowercase();
        let is_first_user = self.count_users().await? == 0;
        let role = if is_first_user { Role::Admin } else { Role::Tenant };

        let row = sqlx::query(
            "INSERT INTO users (email, username, password_hash, role)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&normalized_email)
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;

        row_to_user(&row)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let normalized_email = email.trim().to_ascii_lowercase();
        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(&normalized_email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn email_in_use(&self, email: &str, username: &str) -> Result<bool, StoreError> {
        let normalized_email = email.trim().to_ascii_lowercase();
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)")
            .bind(&normalized_email)
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}
