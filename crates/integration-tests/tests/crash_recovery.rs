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

/// Spec 8 scenario 6. Two stores left in PROVISIONING and one in DELETING
/// after a simulated crash; `recover_stuck_stores` marks the first two
/// FAILED and re-enqueues the third's deletion.
#[tokio::test]
#[serial]
async fn recovery_fails_stuck_provisioning_and_reenqueues_deletion() {
    let store = test_store().await;
    reset_database(store.pool()).await;

    let owner_id = uuid::Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, username, password_hash, role) VALUES ($1, 'recover@x.test', 'recover', 'hash', 'tenant')").bind(owner_id).execute(store.pool()).await.expect("seed user should insert");

    for (id, name) in [("store-dddddddd", "shop-d"), ("store-eeeeeeee", "shop-e")] {
        store.create_store(id, name, Engine::Woocommerce, Some(Theme::Storefront), owner_id, id, id).await.expect("seed store should insert");
        store
            .update_store(id, &UpdateStoreFields { status: Some(StoreStatus::Provisioning), provisioning_started_at: Some(chrono::Utc::now()), ..Default::default() }, Some(StoreStatus::Requested))
            .await
            .expect("seed store should transition to provisioning");
    }

    store.create_store("store-ffffffff", "shop-f", Engine::Medusa, None, owner_id, "store-ffffffff", "store-ffffffff").await.expect("seed store should insert");
    store
        .update_store("store-ffffffff", &UpdateStoreFields { status: Some(StoreStatus::Deleting), ..Default::default() }, Some(StoreStatus::Requested))
        .await
        .expect("seed store should transition to deleting");

    let config = test_config();
    let metrics = Arc::new(Registry::new());
    let orchestrator = Orchestrator::new(store.clone(), config, metrics);

    let recovered = orchestrator.recover_stuck_stores().await;
    assert_eq!(recovered, 3);

    for id in ["store-dddddddd", "store-eeeeeeee"] {
        let record = store.find_store_by_id(id).await.expect("lookup should succeed").expect("store should exist");
        assert_eq!(record.status, StoreStatus::Failed);
        assert!(record.failure_reason.unwrap_or_default().starts_with("Backend restarted"));
    }

    let (events, _total) = store.list_audit_events(Some("store-ffffffff"), None, None, 10, 0).await.expect("audit query should succeed");
    assert!(events.iter().any(|event| event.event_type == shared::models::AuditEventType::Recovery.as_str()));
}
