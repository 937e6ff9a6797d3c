//! Wire and persistence DTOs for the store/audit/user domain (spec 3, 6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::StoreStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Woocommerce,
    Medusa,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Woocommerce => "woocommerce",
            Self::Medusa => "medusa",
        }
    }

    pub fn from_str_loose(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "woocommerce" => Some(Self::Woocommerce),
            "medusa" => Some(Self::Medusa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Storefront,
    Astra,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storefront => "storefront",
            Self::Astra => "astra",
        }
    }

    pub fn from_str_loose(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "storefront" => Some(Self::Storefront),
            "astra" => Some(Self::Astra),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Tenant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Tenant => "tenant",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == "admin" { Self::Admin } else { Self::Tenant }
    }
}

/// Engine-shaped admin credential record. Persisted as jsonb in `stores`;
/// never returned in plaintext to any principal but the owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl AdminCredentials {
    pub fn masked(&self) -> Self {
        Self {
            email: mask_email(&self.email),
            username: self.username.clone(),
            password: "********".to_string(),
        }
    }
}

fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = &local[..1];
            format!("{first}***@{domain}")
        }
        _ => "***".to_string(),
    }
}

/// A row of the `stores` table.
#[derive(Debug, Clone)]
pub struct StoreRecord {
    pub id: String,
    pub name: String,
    pub engine: Engine,
    pub theme: Option<Theme>,
    pub status: StoreStatus,
    pub owner_id: Uuid,
    pub namespace: String,
    pub helm_release: String,
    pub storefront_url: Option<String>,
    pub admin_url: Option<String>,
    pub admin_credentials: Option<AdminCredentials>,
    pub failure_reason: Option<String>,
    pub retry_count: i32,
    pub provisioning_started_at: Option<DateTime<Utc>>,
    pub provisioning_completed_at: Option<DateTime<Utc>>,
    pub provisioning_duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StoreUrls {
    pub storefront: Option<String>,
    pub admin: Option<String>,
}

/// The representative success shape for a store (spec 6).
#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
    pub name: String,
    pub engine: &'static str,
    pub status: String,
    pub theme: Option<&'static str>,
    pub urls: StoreUrls,
    pub namespace: String,
    #[serde(rename = "adminCredentials")]
    pub admin_credentials: Option<AdminCredentials>,
    #[serde(rename = "isCredentialOwner")]
    pub is_credential_owner: bool,
    #[serde(rename = "failureReason")]
    pub failure_reason: Option<String>,
    #[serde(rename = "retryCount")]
    pub retry_count: i32,
    #[serde(rename = "provisioningDurationMs")]
    pub provisioning_duration_ms: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl StoreResponse {
    pub fn from_record(record: &StoreRecord, requester_id: Uuid, is_admin: bool) -> Self {
        let is_owner = record.owner_id == requester_id || is_admin;
        let credentials = record.admin_credentials.as_ref().map(|creds| {
            if record.owner_id == requester_id {
                creds.clone()
            } else {
                creds.masked()
            }
        });
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            engine: record.engine.as_str(),
            status: record.status.as_str().to_ascii_lowercase(),
            theme: record.theme.map(Theme::as_str),
            urls: StoreUrls {
                storefront: record.storefront_url.clone(),
                admin: record.admin_url.clone(),
            },
            namespace: record.namespace.clone(),
            admin_credentials: credentials,
            is_credential_owner: is_owner,
            failure_reason: record.failure_reason.clone(),
            retry_count: record.retry_count,
            provisioning_duration_ms: record.provisioning_duration_ms,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    StoreCreated,
    StatusChange,
    HelmInstall,
    HelmUninstall,
    Info,
    Warning,
    Error,
    Recovery,
    Security,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoreCreated => "store_created",
            Self::StatusChange => "status_change",
            Self::HelmInstall => "helm_install",
            Self::HelmUninstall => "helm_uninstall",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Recovery => "recovery",
            Self::Security => "security",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEventRecord {
    pub id: i64,
    pub store_id: Option<String>,
    pub event_type: String,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub message: String,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub engine: String,
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: &'static str,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role.as_str(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreListQuery {
    pub status: Option<String>,
    pub engine: Option<String>,
    #[serde(rename = "ownerId")]
    pub owner_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    #[serde(rename = "storeId")]
    pub store_id: Option<String>,
    #[serde(rename = "eventType")]
    pub event_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
