//! The error taxonomy: every machine-readable failure the core can raise,
//! each carrying its own HTTP status, human message, suggestion, and
//! retryability so the HTTP layer never has to guess (spec ch. 7).

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RequestTimeout,
    Conflict,
    Locked,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::RequestTimeout => 408,
            Self::Conflict => 409,
            Self::Locked => 423,
            Self::TooManyRequests => 429,
            Self::InternalServerError => 500,
            Self::ServiceUnavailable => 503,
        }
    }
}

/// A machine-readable application error. Every branch of the orchestrator
/// and registry surfaces one of these rather than an ad-hoc string.
#[derive(Debug, Clone)]
pub struct AppError {
    pub code: &'static str,
    pub status: HttpStatus,
    pub message: String,
    pub suggestion: &'static str,
    pub retryable: bool,
    pub details: Option<Value>,
    pub metadata: Option<Value>,
}

impl AppError {
    pub fn new(
        code: &'static str,
        status: HttpStatus,
        message: impl Into<String>,
        suggestion: &'static str,
        retryable: bool,
    ) -> Self {
        Self {
            code,
            status,
            message: message.into(),
            suggestion,
            retryable,
            details: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn store_not_found(store_id: &str) -> Self {
        Self::new(
            "STORE_NOT_FOUND",
            HttpStatus::NotFound,
            format!("Store {store_id} was not found"),
            "Check the store id and try again",
            false,
        )
    }

    pub fn user_not_found() -> Self {
        Self::new(
            "USER_NOT_FOUND",
            HttpStatus::NotFound,
            "User was not found",
            "Check the credentials and try again",
            false,
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(
            "CONFLICT",
            HttpStatus::Conflict,
            message,
            "Reload the resource and retry",
            false,
        )
    }

    pub fn invalid_state_transition(from: &str, to: &str) -> Self {
        Self::new(
            "INVALID_STATE_TRANSITION",
            HttpStatus::Conflict,
            format!("Cannot transition store from {from} to {to}"),
            "Reload the store status before retrying this action",
            false,
        )
    }

    pub fn user_exists() -> Self {
        Self::new(
            "USER_EXISTS",
            HttpStatus::Conflict,
            "A user with that email or username already exists",
            "Sign in instead, or use different credentials",
            false,
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            "VALIDATION_ERROR",
            HttpStatus::BadRequest,
            message,
            "Fix the highlighted fields and retry",
            false,
        )
    }

    pub fn unsupported_engine(engine: &str) -> Self {
        Self::new(
            "UNSUPPORTED_ENGINE",
            HttpStatus::BadRequest,
            format!("Engine {engine} is not supported"),
            "Use one of: woocommerce, medusa",
            false,
        )
    }

    pub fn unauthorized() -> Self {
        Self::new(
            "UNAUTHORIZED",
            HttpStatus::Unauthorized,
            "Missing or invalid bearer token",
            "Sign in again and retry with a fresh token",
            false,
        )
    }

    pub fn forbidden() -> Self {
        Self::new(
            "FORBIDDEN",
            HttpStatus::Forbidden,
            "You do not have access to this resource",
            "Use an account that owns this resource",
            false,
        )
    }

    pub fn invalid_credentials() -> Self {
        Self::new(
            "INVALID_CREDENTIALS",
            HttpStatus::Unauthorized,
            "Email or password is incorrect",
            "Check your credentials and try again",
            false,
        )
    }

    pub fn rate_limit_exceeded(retry_after_seconds: u64) -> Self {
        Self::new(
            "RATE_LIMIT_EXCEEDED",
            HttpStatus::TooManyRequests,
            "Too many requests",
            "Wait before retrying",
            true,
        )
        .with_metadata(serde_json::json!({ "retryAfterSeconds": retry_after_seconds }))
    }

    pub fn store_limit_exceeded(max: u32) -> Self {
        Self::new(
            "STORE_LIMIT_EXCEEDED",
            HttpStatus::TooManyRequests,
            format!("You already have the maximum of {max} active stores"),
            "Delete an existing store before creating a new one",
            false,
        )
    }

    pub fn creation_cooldown(retry_after_seconds: u64) -> Self {
        Self::new(
            "CREATION_COOLDOWN",
            HttpStatus::TooManyRequests,
            "Store creation is rate-limited for your account",
            "Wait for the cooldown to expire and retry",
            true,
        )
        .with_metadata(serde_json::json!({ "retryAfterSeconds": retry_after_seconds }))
    }

    pub fn login_rate_limited(retry_after_seconds: u64) -> Self {
        Self::new(
            "LOGIN_RATE_LIMITED",
            HttpStatus::TooManyRequests,
            "Too many login attempts",
            "Wait before trying to log in again",
            true,
        )
        .with_metadata(serde_json::json!({ "retryAfterSeconds": retry_after_seconds }))
    }

    pub fn registration_rate_limited(retry_after_seconds: u64) -> Self {
        Self::new(
            "REGISTRATION_RATE_LIMITED",
            HttpStatus::TooManyRequests,
            "Too many registration attempts from this address",
            "Wait before registering again",
            true,
        )
        .with_metadata(serde_json::json!({ "retryAfterSeconds": retry_after_seconds }))
    }

    pub fn account_locked(retry_after_seconds: u64) -> Self {
        Self::new(
            "ACCOUNT_LOCKED",
            HttpStatus::Locked,
            "Account is temporarily locked after repeated failed logins",
            "Wait for the lockout to expire and retry",
            true,
        )
        .with_metadata(serde_json::json!({ "retryAfterSeconds": retry_after_seconds }))
    }

    pub fn provisioning_queue_full() -> Self {
        Self::new(
            "PROVISIONING_QUEUE_FULL",
            HttpStatus::ServiceUnavailable,
            "The provisioning queue is full",
            "Retry shortly",
            true,
        )
    }

    pub fn provisioning_queue_timeout() -> Self {
        Self::new(
            "PROVISIONING_QUEUE_TIMEOUT",
            HttpStatus::ServiceUnavailable,
            "Timed out waiting for a provisioning slot",
            "Retry shortly",
            true,
        )
    }

    pub fn circuit_open(retry_after_seconds: u64) -> Self {
        Self::new(
            "CIRCUIT_OPEN",
            HttpStatus::ServiceUnavailable,
            "The cluster API circuit breaker is open",
            "Retry after the breaker resets",
            true,
        )
        .with_metadata(serde_json::json!({ "retryAfterSeconds": retry_after_seconds }))
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            "SERVICE_UNAVAILABLE",
            HttpStatus::ServiceUnavailable,
            message,
            "Retry shortly",
            true,
        )
    }

    pub fn helm_error(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(
            "HELM_ERROR",
            HttpStatus::InternalServerError,
            message,
            "Check the chart installer logs",
            retryable,
        )
    }

    pub fn kubernetes_error(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(
            "KUBERNETES_ERROR",
            HttpStatus::InternalServerError,
            message,
            "Check the cluster adapter logs",
            retryable,
        )
    }

    pub fn provisioning_error(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(
            "PROVISIONING_ERROR",
            HttpStatus::InternalServerError,
            message,
            "Inspect the store's audit trail for the failed step",
            retryable,
        )
    }

    pub fn request_timeout() -> Self {
        Self::new(
            "REQUEST_TIMEOUT",
            HttpStatus::RequestTimeout,
            "The request timed out",
            "Retry the request",
            true,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            "INTERNAL_ERROR",
            HttpStatus::InternalServerError,
            message,
            "Retry later or contact support if this persists",
            false,
        )
    }
}

impl From<crate::repos::StoreError> for AppError {
    fn from(err: crate::repos::StoreError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// The wire shape for `error.code`/`error.message`/... (spec ch. 6).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub suggestion: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code.to_string(),
            message: err.message.clone(),
            suggestion: err.suggestion.to_string(),
            retryable: err.retryable,
            details: err.details.clone(),
            metadata: err.metadata.clone(),
        }
    }
}
