//! Startup sequence: load config, connect to postgres, run migrations,
//! recover stores left mid-transition by a previous crash, then serve.
//! Grounded on the teacher's `worker::main` (config -> connect -> exit(1)
//! on failure) and `http::mod::build_router` for the router itself.

use api_server::http;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use shared::config::ApiConfig;
use shared::guardrails::{LoginGuard, RegistrationGuard, RequestRateLimiter};
use shared::metrics::Registry;
use shared::orchestrator::Orchestrator;
use shared::repos::Store;
use tokio::signal;
use tracing::{error, info, warn};

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "api_server=info,axum=info".to_string()))
        .init();

    let config = match ApiConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!("failed to read api-server config: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.db_pool_min, config.db_pool_max).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = store.run_migrations().await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let metrics = Arc::new(Registry::new());
    let orchestrator = Orchestrator::new(store.clone(), Arc::clone(&config), Arc::clone(&metrics));

    let recovered = orchestrator.recover_stuck_stores().await;
    if recovered > 0 {
        info!(recovered, "resumed stores left mid-transition by a previous crash");
    }

    let app_state = http::AppState {
        orchestrator,
        store,
        config: Arc::clone(&config),
        metrics,
        login_guard: Arc::new(LoginGuard::new(config.login_rate_limit_attempts as usize, config.login_rate_limit_window, config.account_lockout_max_attempts, config.account_lockout_duration)),
        registration_guard: Arc::new(RegistrationGuard::new(5, Duration::from_secs(3600))),
        request_limiter: Arc::new(RequestRateLimiter::new(config.rate_limit_per_minute as usize)),
        trusted_proxy_ips: Arc::new(HashSet::new()),
        shutting_down: Arc::new(AtomicBool::new(false)),
    };
    let shutting_down = Arc::clone(&app_state.shutting_down);
    let orchestrator_for_shutdown = Arc::clone(&app_state.orchestrator);

    let app = http::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().unwrap_or_else(|_| {
        warn!("invalid HOST/PORT, falling back to 0.0.0.0:8080");
        "0.0.0.0:8080".parse().expect("valid fallback bind addr")
    });

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!("api server listening on {}", listener.local_addr().unwrap_or(addr));

    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutting_down, orchestrator_for_shutdown))
        .await;

    match result {
        Ok(()) => {
            info!("shutdown complete");
            std::process::exit(0);
        }
        Err(err) => {
            error!("server error: {err}");
            std::process::exit(1);
        }
    }
}

/// Waits for ctrl-c or SIGTERM, flips readiness to "not ready", and drains
/// the provisioning/deletion limiter queues so queued waiters fail fast
/// instead of outliving the process (spec 5 "Cancellation & timeouts").
/// Resolving this future tells axum to stop accepting connections and start
/// waiting for in-flight ones to finish; a watchdog spawned here bounds that
/// wait to `SHUTDOWN_DRAIN` by forcing the process to exit if it runs long.
async fn shutdown_signal(shutting_down: Arc<AtomicBool>, orchestrator: Arc<Orchestrator>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining");
    shutting_down.store(true, Ordering::SeqCst);
    orchestrator.drain();

    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_DRAIN).await;
        warn!("graceful shutdown drain window elapsed with connections still in flight, forcing exit");
        std::process::exit(0);
    });
}
