use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;

use credit_webhook::stripe::{sign_payload, unix_now};
use credit_webhook::{
    router, AppState, CreditPolicy, MemoryUserStore, SqliteUserStore, StripeVerifier, UserStore,
};

const SECRET: &str = "whsec_integration";

fn app(store: Arc<dyn UserStore>) -> Router {
    let state = AppState::new(
        Arc::new(StripeVerifier::new(SECRET, 300)),
        store,
        CreditPolicy::default(),
    );
    router(state)
}

fn checkout_completed(user_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "evt_checkout",
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_123",
                "object": "checkout.session",
                "metadata": { "userId": user_id }
            }
        }
    }))
    .unwrap()
}

async fn post(app: Router, payload: Vec<u8>, signature: Option<String>) -> (StatusCode, String) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("stripe-signature", signature);
    }

    let response = app
        .oneshot(request.body(Body::from(payload)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn post_signed(app: Router, payload: Vec<u8>) -> (StatusCode, String) {
    let signature = sign_payload(SECRET, unix_now(), &payload);
    post(app, payload, Some(signature)).await
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let store = Arc::new(MemoryUserStore::new());

    let (status, body) = post(app(store.clone()), checkout_completed("u1"), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        json!({ "error": "Invalid Signature" })
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_forged_signature_is_rejected() {
    let store = Arc::new(MemoryUserStore::new());
    let payload = checkout_completed("u1");
    let forged = sign_payload("whsec_attacker", unix_now(), &payload);

    let (status, body) = post(app(store.clone()), payload, Some(forged)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid Signature"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_stale_signature_is_rejected() {
    let store = Arc::new(MemoryUserStore::new());
    let payload = checkout_completed("u1");
    let stale = sign_payload(SECRET, unix_now() - 3_600, &payload);

    let (status, _) = post(app(store.clone()), payload, Some(stale)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_missing_user_id_is_invalid_session() {
    let store = Arc::new(MemoryUserStore::new());
    let payload = serde_json::to_vec(&json!({
        "id": "evt_no_user",
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_1", "metadata": {} } }
    }))
    .unwrap();

    let (status, body) = post_signed(app(store.clone()), payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid session");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_new_user_gets_initial_credit() {
    let store = Arc::new(MemoryUserStore::new());

    let (status, body) = post_signed(app(store.clone()), checkout_completed("u1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Success");
    let user = store.find_by_user_id("u1").await.unwrap().unwrap();
    assert_eq!(user.total_credit, 20_000);
}

#[tokio::test]
async fn test_existing_user_is_topped_up() {
    let store = Arc::new(MemoryUserStore::new());
    store.insert("u2", 5_000).await;

    let (status, body) = post_signed(app(store.clone()), checkout_completed("u2")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Success");
    let user = store.find_by_user_id("u2").await.unwrap().unwrap();
    assert_eq!(user.total_credit, 15_000);
}

#[tokio::test]
async fn test_unhandled_event_type_is_acknowledged() {
    let store = Arc::new(MemoryUserStore::new());
    let payload = serde_json::to_vec(&json!({
        "id": "evt_pi",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_1", "metadata": { "userId": "u1" } } }
    }))
    .unwrap();

    let (status, body) = post_signed(app(store.clone()), payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Invalid event");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_store_failure_is_server_error() {
    let store = Arc::new(SqliteUserStore::connect("sqlite::memory:").await.unwrap());
    store.close().await;

    let (status, body) = post_signed(app(store), checkout_completed("u1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Invalid User not authorized");
}

/// Stripe may deliver the same event more than once. Deliveries are not
/// deduplicated, so a replay credits the user a second time.
#[tokio::test]
async fn test_replayed_event_credits_twice() {
    let store = Arc::new(SqliteUserStore::connect("sqlite::memory:").await.unwrap());
    let payload = checkout_completed("u1");

    let (first, _) = post_signed(app(store.clone()), payload.clone()).await;
    let (second, _) = post_signed(app(store.clone()), payload).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    let user = store.find_by_user_id("u1").await.unwrap().unwrap();
    assert_eq!(user.total_credit, 30_000);
}

#[tokio::test]
async fn test_legacy_route_and_health() {
    let store = Arc::new(MemoryUserStore::new());
    let payload = checkout_completed("u3");
    let signature = sign_payload(SECRET, unix_now(), &payload);

    let response = app(store.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("stripe-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.find_by_user_id("u3").await.unwrap().is_some());

    let response = app(store)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"{"status":"ok"}"#);
}
