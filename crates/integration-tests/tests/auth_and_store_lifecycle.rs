mod support;

use http_body_util::BodyExt;
use serde_json::{Value, json};
use serial_test::serial;
use support::{build_test_router, json_request, reset_database, test_store, with_connect_info};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body should collect").to_bytes();
    serde_json::from_slice(&bytes).expect("body should be valid json")
}

async fn register_and_login(app: &axum::Router, email: &str, password: &str) -> String {
    let register = json_request("POST", "/api/v1/auth/register", json!({ "email": email, "username": email.split('@').next().unwrap(), "password": password }));
    let response = app.clone().oneshot(with_connect_info(register, "10.0.0.1".parse().unwrap())).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::CREATED, "registration should succeed");

    let login = json_request("POST", "/api/v1/auth/login", json!({ "email": email, "password": password }));
    let response = app.clone().oneshot(with_connect_info(login, "10.0.0.1".parse().unwrap())).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::OK, "login should succeed");
    let body = body_json(response).await;
    body["token"].as_str().expect("token should be a string").to_string()
}

/// Spec 8 scenario 1 (partial): only the synchronous half is checked here —
/// the request is accepted, the id matches `store-[0-9a-f]{8}`, status
/// starts at `requested`, and the creation is audited. Reaching `ready`
/// requires a live cluster and isn't exercised by this suite.
#[tokio::test]
#[serial]
async fn create_store_is_accepted_and_audited() {
    let store = test_store().await;
    reset_database(store.pool()).await;
    let app = build_test_router(store.clone()).await;

    let token = register_and_login(&app, "u1@x.test", "correct horse battery staple").await;

    let create = json_request("POST", "/api/v1/stores", json!({ "name": "shop-a", "engine": "woocommerce" }));
    let create = add_bearer(create, &token);
    let response = app.clone().oneshot(with_connect_info(create, "10.0.0.2".parse().unwrap())).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let id = body["id"].as_str().expect("id should be a string");
    assert!(shared::naming::is_valid_store_id(id), "id {id} should match store-[0-9a-f]{{8}}");
    assert_eq!(body["status"], "requested");

    let (events, _total) = store.list_audit_events(Some(id), None, None, 10, 0).await.expect("audit query should succeed");
    assert!(events.iter().any(|event| event.event_type == shared::models::AuditEventType::StoreCreated.as_str()));
}

/// Spec 8 scenario 2.
#[tokio::test]
#[serial]
async fn duplicate_name_is_rejected_once_ready() {
    let store = test_store().await;
    reset_database(store.pool()).await;
    let app = build_test_router(store.clone()).await;

    let token = register_and_login(&app, "u2@x.test", "correct horse battery staple").await;
    let user = store.find_user_by_email("u2@x.test").await.expect("lookup should succeed").expect("user should exist");

    let namespace = format!("store-{}", uuid::Uuid::new_v4());
    store.create_store("store-aaaaaaaa", "shop-a", shared::models::Engine::Woocommerce, Some(shared::models::Theme::Storefront), user.id, &namespace, &namespace).await.expect("seed store should insert");
    store
        .update_store("store-aaaaaaaa", &shared::repos::UpdateStoreFields { status: Some(shared::state_machine::StoreStatus::Ready), ..Default::default() }, Some(shared::state_machine::StoreStatus::Requested))
        .await
        .expect("seed store should transition to ready");

    let create = add_bearer(json_request("POST", "/api/v1/stores", json!({ "name": "shop-a", "engine": "woocommerce" })), &token);
    let response = app.clone().oneshot(with_connect_info(create, "10.0.0.3".parse().unwrap())).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "CONFLICT");
}

/// Spec 8 scenario 3: a FAILED store with the same name doesn't block a
/// new creation, and the prior row is marked DELETED.
#[tokio::test]
#[serial]
async fn failed_store_frees_up_its_name_for_retry() {
    let store = test_store().await;
    reset_database(store.pool()).await;
    let app = build_test_router(store.clone()).await;

    let token = register_and_login(&app, "u3@x.test", "correct horse battery staple").await;
    let user = store.find_user_by_email("u3@x.test").await.expect("lookup should succeed").expect("user should exist");

    store.create_store("store-bbbbbbbb", "shop-b", shared::models::Engine::Woocommerce, Some(shared::models::Theme::Storefront), user.id, "ns", "rel").await.expect("seed store should insert");
    store
        .update_store("store-bbbbbbbb", &shared::repos::UpdateStoreFields { status: Some(shared::state_machine::StoreStatus::Failed), failure_reason: Some("boom".into()), ..Default::default() }, Some(shared::state_machine::StoreStatus::Requested))
        .await
        .expect("seed store should transition to failed");

    let create = add_bearer(json_request("POST", "/api/v1/stores", json!({ "name": "shop-b", "engine": "woocommerce" })), &token);
    let response = app.clone().oneshot(with_connect_info(create, "10.0.0.4".parse().unwrap())).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);

    let prior = store.find_store_by_id("store-bbbbbbbb").await.expect("lookup should succeed").expect("prior row should still exist");
    assert_eq!(prior.status, shared::state_machine::StoreStatus::Deleted);
}

fn add_bearer(mut req: axum::http::Request<axum::body::Body>, token: &str) -> axum::http::Request<axum::body::Body> {
    req.headers_mut().insert(axum::http::header::AUTHORIZATION, format!("Bearer {token}").parse().expect("header value should parse"));
    req
}
