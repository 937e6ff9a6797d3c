//! `GET /api/v1/health{,/live,/ready}` (spec 4.15), grounded on the
//! teacher's `http::health::{healthz, readyz}` — `healthz` is a bare
//! liveness probe, `readyz` additionally pings the database. `health`
//! adds the concurrency and circuit-breaker snapshot the spec calls for.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

pub(super) async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(OkResponse { ok: true }))
}

pub(super) async fn readyz(State(state): State<AppState>) -> Response {
    if state.shutting_down.load(std::sync::atomic::Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(OkResponse { ok: false })).into_response();
    }

    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(OkResponse { ok: false })).into_response()
        }
    }
}

#[derive(Serialize)]
struct ConcurrencySnapshot {
    active: usize,
    queued: usize,
    #[serde(rename = "maxConcurrent")]
    max_concurrent: usize,
    #[serde(rename = "maxQueueSize")]
    max_queue_size: usize,
}

#[derive(Serialize)]
struct BreakerSnapshot {
    name: String,
    state: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    concurrency: ConcurrencySnapshot,
    #[serde(rename = "circuitBreakers")]
    circuit_breakers: Vec<BreakerSnapshot>,
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    let database = match state.store.ping().await {
        Ok(()) => "up",
        Err(err) => {
            tracing::warn!(error = %err, "health check: database unreachable");
            "down"
        }
    };

    let stats = state.orchestrator.get_concurrency_stats();
    let breakers = state
        .orchestrator
        .cluster_breaker_states()
        .into_iter()
        .map(|(name, breaker_state)| BreakerSnapshot {
            name,
            state: match breaker_state {
                shared::circuit_breaker::BreakerState::Closed => "closed",
                shared::circuit_breaker::BreakerState::Open => "open",
                shared::circuit_breaker::BreakerState::HalfOpen => "half_open",
            },
        })
        .collect();

    let status = if database == "up" { "ok" } else { "degraded" };
    let status_code = if database == "up" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status,
            database,
            concurrency: ConcurrencySnapshot {
                active: stats.active,
                queued: stats.queued,
                max_concurrent: stats.max_concurrent,
                max_queue_size: stats.max_queue_size,
            },
            circuit_breakers: breakers,
        }),
    )
        .into_response()
}
