//! `GET /api/v1/audit` (spec 4.15) — tenants see only their own stores'
//! events; the owner scoping is enforced by `list_audit_events`'s join on
//! `stores.owner_id`, not re-derived here.

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::errors::app_error_response;
use super::observability::RequestContext;
use super::{AppState, AuthUser};
use shared::errors::AppError;
use shared::models::{AuditEventRecord, AuditListQuery};

#[derive(Serialize)]
struct AuditEventsResponse {
    items: Vec<AuditEventRecord>,
    total: i64,
}

pub(super) async fn list_audit_events(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<AuditListQuery>,
) -> Response {
    let owner_id = if user.is_admin() { None } else { Some(user.user_id) };
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    match state.store.list_audit_events(query.store_id.as_deref(), query.event_type.as_deref(), owner_id, limit, offset).await {
        Ok((items, total)) => Json(AuditEventsResponse { items, total }).into_response(),
        Err(err) => app_error_response(&AppError::from(err), &ctx.request_id),
    }
}
