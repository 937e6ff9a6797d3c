//! `/api/v1/auth/*` (spec 4.12, 4.15). Registration promotes the first
//! account in the system to admin (`shared::repos::Store::create_user`);
//! login is guarded by `LoginGuard`'s rate limit + consecutive-failure
//! lockout, registration by `RegistrationGuard`'s per-IP quota.

use axum::extract::{ConnectInfo, Extension, Json, State};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use super::errors::app_error_response;
use super::observability::RequestContext;
use super::{AppState, AuthUser};
use shared::errors::AppError;
use shared::models::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use shared::security::{hash_password, issue_token, verify_password};

fn validate_email(email: &str) -> Result<(), AppError> {
    let trimmed = email.trim();
    if trimmed.is_empty() || !trimmed.contains('@') || trimmed.len() > 254 {
        return Err(AppError::validation("email must be a valid address"));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), AppError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(AppError::validation("username must be between 3 and 32 characters"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 {
        return Err(AppError::validation("password must be at least 8 characters"));
    }
    Ok(())
}

pub(super) async fn register(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    if let Err(err) = state.registration_guard.check(&addr.ip().to_string()) {
        return app_error_response(&err, &ctx.request_id);
    }

    if let Err(err) = validate_email(&req.email).and_then(|()| validate_username(&req.username)).and_then(|()| validate_password(&req.password)) {
        return app_error_response(&err, &ctx.request_id);
    }

    match state.store.email_in_use(&req.email, &req.username).await {
        Ok(true) => return app_error_response(&AppError::user_exists(), &ctx.request_id),
        Ok(false) => {}
        Err(err) => return app_error_response(&AppError::from(err), &ctx.request_id),
    }

    let password_hash = match hash_password(&req.password) {
        Ok(hash) => hash,
        Err(err) => return app_error_response(&err, &ctx.request_id),
    };

    match state.store.create_user(&req.email, &req.username, &password_hash).await {
        Ok(user) => (axum::http::StatusCode::CREATED, axum::Json(UserResponse::from(&user))).into_response(),
        Err(err) => app_error_response(&AppError::from(err), &ctx.request_id),
    }
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> Response {
    let ip = addr.ip().to_string();
    let email = req.email.trim().to_ascii_lowercase();

    if let Err(err) = state.login_guard.check(&ip, &email) {
        return app_error_response(&err, &ctx.request_id);
    }

    let user = match state.store.find_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            state.login_guard.record_failure(&email);
            return app_error_response(&AppError::invalid_credentials(), &ctx.request_id);
        }
        Err(err) => return app_error_response(&AppError::from(err), &ctx.request_id),
    };

    if !user.is_active || !verify_password(&req.password, &user.password_hash) {
        state.login_guard.record_failure(&email);
        return app_error_response(&AppError::invalid_credentials(), &ctx.request_id);
    }

    state.login_guard.record_success(&email);

    let pair = match issue_token(user.id, &user.email, user.role, &state.config.jwt_secret, chrono::Duration::from_std(state.config.jwt_expires_in).unwrap_or(chrono::Duration::hours(24))) {
        Ok(pair) => pair,
        Err(err) => return app_error_response(&err, &ctx.request_id),
    };

    axum::Json(TokenResponse {
        token: pair.token,
        expires_in: pair.expires_in,
    })
    .into_response()
}

pub(super) async fn me(State(state): State<AppState>, Extension(user): Extension<AuthUser>, Extension(ctx): Extension<RequestContext>) -> Response {
    match state.store.find_user_by_id(user.user_id).await {
        Ok(Some(record)) => axum::Json(UserResponse::from(&record)).into_response(),
        Ok(None) => app_error_response(&AppError::user_not_found(), &ctx.request_id),
        Err(err) => app_error_response(&AppError::from(err), &ctx.request_id),
    }
}
