pub mod chart_installer;
pub mod circuit_breaker;
pub mod cluster_adapter;
pub mod concurrency_limiter;
pub mod config;
pub mod engine_setup;
pub mod errors;
pub mod guardrails;
pub mod metrics;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod repos;
pub mod retry;
pub mod security;
pub mod state_machine;
