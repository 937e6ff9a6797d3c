mod support;

use serial_test::serial;
use shared::config::ApiConfig;
use shared::metrics::Registry;
use shared::models::{Engine, Theme};
use shared::orchestrator::Orchestrator;
use shared::repos::UpdateStoreFields;
use shared::state_machine::StoreStatus;
use std::sync::Arc;
use support::{reset_database, test_store};

fn test_config() -> Arc<ApiConfig> {
    // SAFETY: `#[serial]` guarantees this is the only test mutating env vars at a time.
    unsafe {
        std::env::set_var("JWT_SECRET", "integration-tests-jwt-secret-value");
    }
    Arc::new(ApiConfig::from_env().expect("test config should load"))
}

/// Spec 8 scenario 4: two identical `retryStore(id)` calls racing over the
/// same FAILED row. The `WHERE status = $expected` optimistic update in
/// `Store::update_store` guarantees only one observes the row in FAILED.
#[tokio::test]
#[serial]
async fn only_one_concurrent_retry_wins() {
    let store = test_store().await;
    reset_database(store.pool()).await;

    let owner_id = uuid::Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, username, password_hash, role) VALUES ($1, 'race@x.test', 'race', 'hash', 'tenant')").bind(owner_id).execute(store.pool()).await.expect("seed user should insert");

    store.create_store("store-cccccccc", "shop-c", Engine::Woocommerce, Some(Theme::Storefront), owner_id, "ns-c", "rel-c").await.expect("seed store should insert");
    store
        .update_store("store-cccccccc", &UpdateStoreFields { status: Some(StoreStatus::Failed), failure_reason: Some("boom".into()), ..Default::default() }, Some(StoreStatus::Requested))
        .await
        .expect("seed store should transition to failed");

    let config = test_config();
    let metrics = Arc::new(Registry::new());
    let orchestrator = Orchestrator::new(store.clone(), config, metrics);

    let (left, right) = tokio::join!(orchestrator.retry_store("store-cccccccc"), orchestrator.retry_store("store-cccccccc"));

    let outcomes = [left, right];
    let ok_count = outcomes.iter().filter(|result| result.is_ok()).count();
    let conflict_count = outcomes.iter().filter(|result| matches!(result, Err(err) if err.code == "INVALID_STATE_TRANSITION" || err.code == "CONFLICT")).count();

    assert_eq!(ok_count, 1, "exactly one racing retry should win");
    assert_eq!(conflict_count, 1, "the loser should see a conflict, not a silent success");
}
