mod support;

use serial_test::serial;
use shared::config::ApiConfig;
use shared::metrics::Registry;
use shared::models::{Engine, Theme};
use shared::orchestrator::Orchestrator;
use std::sync::Arc;
use support::{reset_database, test_store};

fn limited_config() -> Arc<ApiConfig> {
    // SAFETY: `#[serial]` guarantees this is the only test mutating env vars at a time.
    unsafe {
        std::env::set_var("JWT_SECRET", "integration-tests-jwt-secret-value");
        std::env::set_var("MAX_STORES_PER_USER", "2");
        std::env::set_var("STORE_CREATION_COOLDOWN_MS", "60000");
    }
    Arc::new(ApiConfig::from_env().expect("test config should load"))
}

/// Spec 8 boundary behaviors: the (N+1)th store for a user at
/// `maxStoresPerUser=N` is rejected, and a second creation by the same
/// non-admin owner inside the cooldown window is rejected too.
#[tokio::test]
#[serial]
async fn store_limit_and_cooldown_are_enforced() {
    let store = test_store().await;
    reset_database(store.pool()).await;

    let owner_id = uuid::Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, username, password_hash, role) VALUES ($1, 'limits@x.test', 'limits', 'hash', 'tenant')").bind(owner_id).execute(store.pool()).await.expect("seed user should insert");

    let config = limited_config();
    let metrics = Arc::new(Registry::new());
    let orchestrator = Orchestrator::new(store.clone(), config, metrics);

    let first = orchestrator.create_store("shop-one", Engine::Woocommerce, Some(Theme::Storefront), owner_id, false).await;
    assert!(first.is_ok(), "first creation should succeed");

    let second = orchestrator.create_store("shop-two", Engine::Woocommerce, Some(Theme::Storefront), owner_id, false).await;
    match second {
        Err(err) => assert_eq!(err.code, "CREATION_COOLDOWN", "second creation inside the cooldown window should be rejected"),
        Ok(_) => panic!("second creation should have hit the cooldown before the store limit"),
    }
}

/// Admins bypass the cooldown (spec 4.13), so this exercises the store
/// limit in isolation.
#[tokio::test]
#[serial]
async fn store_limit_is_enforced_for_admins_without_cooldown() {
    let store = test_store().await;
    reset_database(store.pool()).await;

    let owner_id = uuid::Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, username, password_hash, role) VALUES ($1, 'admin@x.test', 'admin', 'hash', 'admin')").bind(owner_id).execute(store.pool()).await.expect("seed user should insert");

    let config = limited_config();
    let metrics = Arc::new(Registry::new());
    let orchestrator = Orchestrator::new(store.clone(), config, metrics);

    for name in ["shop-a1", "shop-a2"] {
        orchestrator.create_store(name, Engine::Woocommerce, Some(Theme::Storefront), owner_id, true).await.expect("admin creations under the limit should succeed");
    }

    let third = orchestrator.create_store("shop-a3", Engine::Woocommerce, Some(Theme::Storefront), owner_id, true).await;
    match third {
        Err(err) => assert_eq!(err.code, "STORE_LIMIT_EXCEEDED"),
        Ok(_) => panic!("third creation should have exceeded the store limit"),
    }
}
