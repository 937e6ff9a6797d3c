//! `GET /api/v1/metrics` (spec 4.15) — admin-only, Prometheus text
//! exposition straight from `shared::metrics::Registry::render`.

use axum::extract::{Extension, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::errors::app_error_response;
use super::observability::RequestContext;
use super::{AppState, AuthUser};
use shared::errors::AppError;

pub(super) async fn metrics(State(state): State<AppState>, Extension(user): Extension<AuthUser>, Extension(ctx): Extension<RequestContext>) -> Response {
    if !user.is_admin() {
        return app_error_response(&AppError::forbidden(), &ctx.request_id);
    }

    refresh_gauges(&state).await;

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.metrics.render()).into_response()
}

/// Gauges hold last-set-value semantics, so the values the spec 4.16
/// series need are recomputed here at scrape time rather than tracked by
/// a background ticker.
async fn refresh_gauges(state: &AppState) {
    let stats = state.orchestrator.get_concurrency_stats();
    state.metrics.set_gauge("provisioning_concurrent_operations", "permits currently granted by the provisioning concurrency limiter", vec![], stats.active as f64);
    state.metrics.set_gauge("provisioning_queue_depth", "requests waiting for a provisioning concurrency slot", vec![], stats.queued as f64);

    state.metrics.set_gauge(
        "active_provisioning_operations",
        "store ids currently undergoing a provisioning or deletion operation",
        vec![],
        state.orchestrator.active_operation_count() as f64,
    );

    match state.store.count_stores_by_status().await {
        Ok(counts) => {
            for (status, count) in counts {
                state.metrics.set_gauge("stores_total", "store count by lifecycle status", vec![("status", status.as_str().to_string())], count as f64);
            }
        }
        Err(err) => tracing::warn!(error = %err, "failed to refresh stores_total gauge"),
    }
}
