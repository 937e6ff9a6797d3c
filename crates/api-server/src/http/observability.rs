//! Request-id propagation and structured request logging, adapted
//! directly from the teacher's `http::observability` — same header name,
//! same normalization rules, same info/warn split on 5xx.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use shared::metrics::normalize_route;

use super::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
pub(crate) struct RequestContext {
    pub(crate) request_id: String,
}

pub(super) async fn request_observability_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let request_id = resolve_request_id(&req);
    req.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let method = req.method().clone();
    let route = normalize_route(req.uri().path());
    let started_at = Instant::now();

    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(header::HeaderName::from_static(REQUEST_ID_HEADER), header_value);
    }

    let status = response.status().as_u16();
    let latency_ms = started_at.elapsed().as_millis() as u64;

    state.metrics.incr_counter(
        "http_requests_total",
        "total HTTP requests by method, route, and status",
        vec![("method", method.to_string()), ("route", route.clone()), ("status", status.to_string())],
    );
    state.metrics.observe_histogram(
        "http_request_duration_ms",
        "HTTP request duration in milliseconds",
        vec![("method", method.to_string()), ("route", route.clone())],
        latency_ms as f64,
    );

    if status >= 500 {
        warn!(request_id = %request_id, method = %method, route = %route, status, latency_ms, metric_name = "api_http_request", "api request completed with server error");
    } else {
        info!(request_id = %request_id, method = %method, route = %route, status, latency_ms, metric_name = "api_http_request", "api request metrics");
    }

    response
}

fn resolve_request_id(req: &Request) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(normalize_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn normalize_request_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_REQUEST_ID_LEN {
        return None;
    }
    let valid = trimmed.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.'));
    valid.then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::normalize_request_id;

    #[test]
    fn normalizes_valid_request_ids() {
        assert_eq!(normalize_request_id(" req_abc123.-1 "), Some("req_abc123.-1".to_string()));
    }

    #[test]
    fn rejects_invalid_request_ids() {
        assert!(normalize_request_id("").is_none());
        assert!(normalize_request_id("abc$123").is_none());
        assert!(normalize_request_id(&"x".repeat(129)).is_none());
    }
}
