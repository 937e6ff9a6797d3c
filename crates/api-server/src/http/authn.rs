//! Bearer token auth middleware, adapted from the teacher's
//! `http::authn::auth_middleware`. The teacher looks up an opaque session
//! hash against the database; this system issues its own signed JWT
//! (spec 4.12), so verification is a pure, stateless
//! `shared::security::verify_token` call instead of a DB round trip.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use super::errors::app_error_response;
use super::observability::RequestContext;
use super::{AppState, AuthUser};
use shared::errors::AppError;
use shared::models::Role;
use shared::security::verify_token;

pub(super) async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let auth_header = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or_default();

    let token = auth_header.strip_prefix("Bearer ").map(str::trim).filter(|token| !token.is_empty());

    let Some(token) = token else {
        return app_error_response(&AppError::unauthorized(), &request_id);
    };

    let claims = match verify_token(token, &state.config.jwt_secret) {
        Ok(claims) => claims,
        Err(err) => return app_error_response(&err, &request_id),
    };

    req.extensions_mut().insert(AuthUser {
        user_id: claims.id,
        role: Role::from_db(&claims.role),
    });
    next.run(req).await
}
