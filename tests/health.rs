mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use storefront_api::{routes::create_app, services::payment_service};
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = create_app(common::setup_state().await);
    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Health check");
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "ok");
}

#[tokio::test]
async fn unknown_routes_get_a_json_404() {
    let app = create_app(common::setup_state().await);
    let (status, body) = send(
        &app,
        Request::builder().uri("/nope").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/nope");
}

#[tokio::test]
async fn malformed_bodies_are_unprocessable() {
    let app = create_app(common::setup_state().await);

    let request = Request::builder()
        .method("POST")
        .uri("/api/users/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["data"]["fields"]["json"].is_array());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/users/register",
            json!({ "email": "not-an-email", "password": "short" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["data"]["fields"]["email"].is_array());
    assert!(body["data"]["fields"]["password"].is_array());
}

#[tokio::test]
async fn protected_routes_require_credentials() {
    let app = create_app(common::setup_state().await);

    let (status, _) = send(
        &app,
        Request::builder().uri("/api/users/me").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Request::builder().uri("/api/cart").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/cart")
            .header("x-session-id", "guest-42")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subtotal"], 0);
}

#[tokio::test]
async fn register_login_and_fetch_profile() {
    let app = create_app(common::setup_state().await);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/users/register",
            json!({ "email": "new@example.com", "password": "long enough" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/users/login",
            json!({ "email": "new@example.com", "password": "long enough" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().expect("token").to_string();
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/users/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "new@example.com");
    assert_eq!(body["data"]["role"], "customer");

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/admin/dashboard")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn payment_callbacks_must_be_signed() {
    let app = create_app(common::setup_state().await);
    let payload = json!({ "tx_ref": "TX-missing", "status": "success" }).to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/api/payments/callback")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _) = send(&app, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = Request::builder()
        .method("POST")
        .uri("/api/payments/callback")
        .header(payment_service::SIGNATURE_HEADER, "deadbeef")
        .body(Body::from(payload.clone()))
        .unwrap();
    let (status, _) = send(&app, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let signature = payment_service::sign_payload(common::WEBHOOK_SECRET, payload.as_bytes()).unwrap();
    let signed = Request::builder()
        .method("POST")
        .uri("/api/payments/callback")
        .header(payment_service::SIGNATURE_HEADER, signature)
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send(&app, signed).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
