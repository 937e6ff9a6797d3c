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

/// Spec 8 boundary behavior: 5 consecutive wrong passwords lock the
/// account; the 6th attempt is rejected with 423 even with the right
/// password.
#[tokio::test]
#[serial]
async fn five_failures_lock_the_account_even_for_a_correct_sixth_attempt() {
    let store = test_store().await;
    reset_database(store.pool()).await;
    let app = build_test_router(store).await;
    let ip: std::net::IpAddr = "10.1.1.1".parse().unwrap();

    let register = json_request("POST", "/api/v1/auth/register", json!({ "email": "locked@x.test", "username": "locked", "password": "correct horse battery staple" }));
    let response = app.clone().oneshot(with_connect_info(register, ip)).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);

    for _ in 0..5 {
        let login = json_request("POST", "/api/v1/auth/login", json!({ "email": "locked@x.test", "password": "wrong password" }));
        let response = app.clone().oneshot(with_connect_info(login, ip)).await.expect("request should complete");
        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    let login = json_request("POST", "/api/v1/auth/login", json!({ "email": "locked@x.test", "password": "correct horse battery staple" }));
    let response = app.clone().oneshot(with_connect_info(login, ip)).await.expect("request should complete");
    assert_eq!(response.status(), axum::http::StatusCode::LOCKED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "ACCOUNT_LOCKED");
}
