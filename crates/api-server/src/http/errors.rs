//! `AppError` -> axum `Response` mapping (spec ch. 6, 7). One generic
//! function rather than the teacher's per-case helpers, since every
//! failure in this system already carries its own status/code/message —
//! there's no per-endpoint error shape left to special-case.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shared::errors::{AppError, ErrorBody};

#[derive(Serialize)]
struct ErrorEnvelope {
    #[serde(rename = "requestId")]
    request_id: String,
    error: ErrorBody,
}

pub(super) fn app_error_response(err: &AppError, request_id: &str) -> Response {
    let status = StatusCode::from_u16(err.status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorEnvelope {
            request_id: request_id.to_string(),
            error: ErrorBody::from(err),
        }),
    )
        .into_response()
}
