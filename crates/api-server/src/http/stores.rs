//! `/api/v1/stores*` (spec 4.15). Thin handlers delegating straight to
//! `shared::orchestrator::Orchestrator`; all of the interesting work
//! (optimistic transitions, guardrails, async workers) lives there.

use axum::extract::{Extension, Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::errors::app_error_response;
use super::observability::RequestContext;
use super::{AppState, AuthUser};
use shared::errors::AppError;
use shared::models::{CreateStoreRequest, Engine, StoreListQuery, StoreResponse, Theme};
use shared::naming::validate_store_name;
use shared::repos::StoreFilter;
use shared::state_machine::StoreStatus;

fn parse_engine(raw: &str) -> Result<Engine, AppError> {
    Engine::from_str_loose(raw).ok_or_else(|| AppError::unsupported_engine(raw))
}

fn parse_theme(engine: Engine, raw: Option<&str>) -> Result<Option<Theme>, AppError> {
    match (engine, raw) {
        (Engine::Woocommerce, Some(raw)) => {
            Theme::from_str_loose(raw).map(Some).ok_or_else(|| AppError::validation(format!("unknown theme {raw}")))
        }
        (Engine::Woocommerce, None) => Ok(Some(Theme::Storefront)),
        (Engine::Medusa, _) => Ok(None),
    }
}

pub(super) async fn create_store(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateStoreRequest>,
) -> Response {
    let name = req.name.trim().to_ascii_lowercase();
    if let Err(message) = validate_store_name(&name) {
        return app_error_response(&AppError::validation(message), &ctx.request_id);
    }

    let engine = match parse_engine(&req.engine) {
        Ok(engine) => engine,
        Err(err) => return app_error_response(&err, &ctx.request_id),
    };
    let theme = match parse_theme(engine, req.theme.as_deref()) {
        Ok(theme) => theme,
        Err(err) => return app_error_response(&err, &ctx.request_id),
    };

    match state.orchestrator.create_store(&name, engine, theme, user.user_id, user.is_admin()).await {
        Ok(record) => (StatusCode::ACCEPTED, Json(StoreResponse::from_record(&record, user.user_id, user.is_admin()))).into_response(),
        Err(err) => app_error_response(&err, &ctx.request_id),
    }
}

pub(super) async fn list_stores(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<StoreListQuery>,
) -> Response {
    let status = match query.status.as_deref().map(StoreStatus::from_db).transpose() {
        Ok(status) => status,
        Err(message) => return app_error_response(&AppError::validation(message), &ctx.request_id),
    };
    let engine = match query.engine.as_deref().map(|raw| Engine::from_str_loose(raw).ok_or_else(|| AppError::unsupported_engine(raw))).transpose() {
        Ok(engine) => engine,
        Err(err) => return app_error_response(&err, &ctx.request_id),
    };

    let owner_id = if user.is_admin() { query.owner_id } else { Some(user.user_id) };

    let filter = StoreFilter {
        owner_id,
        status,
        engine,
        include_deleted: false,
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    match state.orchestrator.list_stores(&filter, limit, offset).await {
        Ok(records) => {
            let items: Vec<StoreResponse> = records.iter().map(|record| StoreResponse::from_record(record, user.user_id, user.is_admin())).collect();
            Json(items).into_response()
        }
        Err(err) => app_error_response(&err, &ctx.request_id),
    }
}

async fn load_owned_store(state: &AppState, user: &AuthUser, store_id: &str) -> Result<shared::models::StoreRecord, AppError> {
    let record = state.orchestrator.get_store(store_id).await?;
    if record.owner_id != user.user_id && !user.is_admin() {
        return Err(AppError::forbidden());
    }
    Ok(record)
}

pub(super) async fn get_store(State(state): State<AppState>, Extension(user): Extension<AuthUser>, Extension(ctx): Extension<RequestContext>, Path(id): Path<String>) -> Response {
    match load_owned_store(&state, &user, &id).await {
        Ok(record) => Json(StoreResponse::from_record(&record, user.user_id, user.is_admin())).into_response(),
        Err(err) => app_error_response(&err, &ctx.request_id),
    }
}

pub(super) async fn delete_store(State(state): State<AppState>, Extension(user): Extension<AuthUser>, Extension(ctx): Extension<RequestContext>, Path(id): Path<String>) -> Response {
    if let Err(err) = load_owned_store(&state, &user, &id).await {
        return app_error_response(&err, &ctx.request_id);
    }
    match state.orchestrator.delete_store(&id).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => app_error_response(&err, &ctx.request_id),
    }
}

pub(super) async fn retry_store(State(state): State<AppState>, Extension(user): Extension<AuthUser>, Extension(ctx): Extension<RequestContext>, Path(id): Path<String>) -> Response {
    if let Err(err) = load_owned_store(&state, &user, &id).await {
        return app_error_response(&err, &ctx.request_id);
    }
    match state.orchestrator.retry_store(&id).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err) => app_error_response(&err, &ctx.request_id),
    }
}

#[derive(serde::Deserialize)]
pub(super) struct LogsQuery {
    limit: Option<i64>,
}

pub(super) async fn get_store_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Response {
    if let Err(err) = load_owned_store(&state, &user, &id).await {
        return app_error_response(&err, &ctx.request_id);
    }
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    match state.orchestrator.get_store_logs(&id, limit).await {
        Ok(events) => Json(events).into_response(),
        Err(err) => app_error_response(&err, &ctx.request_id),
    }
}
