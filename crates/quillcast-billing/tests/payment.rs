use std::sync::Arc;

use quillcast_billing::{
    cancel_user_subscription, ensure_customer, start_trial, BillingError, PaymentClient,
};
use quillcast_db::{LedgerStore, MemoryStore};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> PaymentClient {
    PaymentClient::with_base_url(Some("sk_test_123"), 5, &server.uri()).unwrap()
}

#[tokio::test]
async fn create_subscription_sends_trial_days_form_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/subscriptions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(body_string_contains("customer=cus_1"))
        .and(body_string_contains("trial_period_days=14"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sub_1",
            "status": "trialing",
            "trial_end": 1_767_225_600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sub = client(&server)
        .create_subscription_with_trial("cus_1", "price_pro", 14)
        .await
        .unwrap();
    assert_eq!(sub.id, "sub_1");
    assert_eq!(sub.status, "trialing");
}

#[tokio::test]
async fn cancel_uses_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscriptions/sub_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sub_1",
            "status": "canceled"
        })))
        .mount(&server)
        .await;

    let sub = client(&server).cancel_subscription("sub_1").await.unwrap();
    assert_eq!(sub.status, "canceled");
}

#[tokio::test]
async fn error_body_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "message": "Invalid email address" }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_customer("nope", Uuid::new_v4())
        .await
        .unwrap_err();
    match err {
        BillingError::Payment { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid email address");
        }
        other => panic!("expected Payment error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = PaymentClient::with_base_url(None, 5, &server.uri()).unwrap();
    assert!(matches!(
        client.create_customer("a@b.example", Uuid::new_v4()).await,
        Err(BillingError::MissingApiKey)
    ));
}

#[tokio::test]
async fn customer_is_created_once_and_stored_on_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .and(body_string_contains("metadata%5Buser_id%5D="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cus_42",
            "email": "owner@brand.example"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let payments = client(&server);
    let user = Uuid::new_v4();

    let first = ensure_customer(store.as_ref(), &payments, user, "owner@brand.example")
        .await
        .unwrap();
    let second = ensure_customer(store.as_ref(), &payments, user, "owner@brand.example")
        .await
        .unwrap();

    assert_eq!(first, "cus_42");
    assert_eq!(second, "cus_42");
    let profile = store.billing_profile(user).await.unwrap().unwrap();
    assert_eq!(profile.payment_customer_id.as_deref(), Some("cus_42"));
}

#[tokio::test]
async fn trial_start_and_cancel_are_recorded_on_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cus_7"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/subscriptions"))
        .and(body_string_contains("customer=cus_7"))
        .and(body_string_contains("price_pro"))
        .and(body_string_contains("trial_period_days=7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sub_7",
            "status": "trialing"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscriptions/sub_7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "sub_7",
            "status": "canceled"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let payments = client(&server);
    let user = Uuid::new_v4();

    let started = start_trial(
        store.as_ref(),
        &payments,
        user,
        "owner@brand.example",
        "price_pro",
        7,
    )
    .await
    .unwrap();
    assert_eq!(started.status, "trialing");
    let profile = store.billing_profile(user).await.unwrap().unwrap();
    assert_eq!(profile.payment_customer_id.as_deref(), Some("cus_7"));
    assert_eq!(profile.subscription_id.as_deref(), Some("sub_7"));

    let cancelled = cancel_user_subscription(store.as_ref(), &payments, user)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "canceled");
    let profile = store.billing_profile(user).await.unwrap().unwrap();
    assert_eq!(profile.subscription_status.as_deref(), Some("canceled"));
    assert_eq!(profile.subscription_id.as_deref(), Some("sub_7"));
}

#[tokio::test]
async fn cancel_without_subscription_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    assert!(matches!(
        cancel_user_subscription(store.as_ref(), &client(&server), user).await,
        Err(BillingError::NoSubscription(id)) if id == user
    ));
}
