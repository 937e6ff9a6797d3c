//! HTTP surface (spec 4.15). Routes exactly as the spec's method/path
//! table, composed the way the teacher's `http::build_router` does:
//! `public_routes.merge(protected_routes)` with a blanket auth layer over
//! the protected half and the request-id/logging layer over everything.

mod audit;
mod authn;
mod auth_routes;
mod errors;
mod health;
mod metrics_route;
mod observability;
mod rate_limit;
mod stores;

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::config::ApiConfig;
use shared::guardrails::{LoginGuard, RegistrationGuard, RequestRateLimiter};
use shared::metrics::Registry;
use shared::models::Role;
use shared::orchestrator::Orchestrator;
use shared::repos::Store;
use uuid::Uuid;

pub(crate) use observability::RequestContext;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Store,
    pub config: Arc<ApiConfig>,
    pub metrics: Arc<Registry>,
    pub login_guard: Arc<LoginGuard>,
    pub registration_guard: Arc<RegistrationGuard>,
    pub request_limiter: Arc<RequestRateLimiter>,
    pub trusted_proxy_ips: Arc<HashSet<IpAddr>>,
    /// Flipped once on shutdown so `/health/ready` fails fast while
    /// in-flight requests drain (spec 5 "Cancellation & timeouts").
    pub shutting_down: Arc<AtomicBool>,
}

#[derive(Clone, Copy)]
pub(super) struct AuthUser {
    pub(super) user_id: Uuid,
    pub(super) role: Role,
}

impl AuthUser {
    pub(super) fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let observability_state = app_state.clone();

    let public_routes = Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/health/live", get(health::healthz))
        .route("/api/v1/health/ready", get(health::readyz))
        .route("/api/v1/auth/register", post(auth_routes::register))
        .route("/api/v1/auth/login", post(auth_routes::login))
        .with_state(app_state.clone());

    let auth_layer_state = app_state.clone();

    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(auth_routes::me))
        .route("/api/v1/stores", post(stores::create_store).get(stores::list_stores))
        .route("/api/v1/stores/{id}", get(stores::get_store).delete(stores::delete_store))
        .route("/api/v1/stores/{id}/retry", post(stores::retry_store))
        .route("/api/v1/stores/{id}/logs", get(stores::get_store_logs))
        .route("/api/v1/audit", get(audit::list_audit_events))
        .route("/api/v1/metrics", get(metrics_route::metrics))
        .layer(middleware::from_fn_with_state(auth_layer_state, authn::auth_middleware))
        .with_state(app_state.clone());

    public_routes
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(app_state, rate_limit::request_rate_limit_middleware))
        .layer(middleware::from_fn_with_state(observability_state, observability::request_observability_middleware))
}
