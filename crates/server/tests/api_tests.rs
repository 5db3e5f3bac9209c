use std::sync::Arc;

use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use hookline_core::DeliveryStatus;
use hookline_gateway::testing::ScriptedTransport;
use hookline_server::api::AppState;
use hookline_server::config::HooklineConfig;
use hookline_signature::SignatureScheme;
use hookline_state::WebhookRepository;
use hookline_state_memory::MemoryRepository;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

const CONFIG: &str = r#"
[dispatcher]
jitter_ratio = 0.0

[[sources]]
name = "shop"
secret = "shop-secret"

[[sources]]
name = "github"
kind = "github"
secret = "gh-secret"
forward = true

[[endpoints]]
id = "crm"
url = "https://crm.example.com/hooks"
secret = "crm-secret"

[[subscriptions]]
id = "pushes"
endpoint = "crm"
event_types = ["push", "order.*"]
"#;

// -- Helpers --------------------------------------------------------------

struct TestApp {
    state: AppState,
    repo: Arc<MemoryRepository>,
    transport: Arc<ScriptedTransport>,
}

async fn test_app(transport: ScriptedTransport) -> TestApp {
    let config = HooklineConfig::from_toml(CONFIG).unwrap();
    let repo = Arc::new(MemoryRepository::new());
    let transport = Arc::new(transport);
    let state = hookline_server::app::build_state(&config, repo.clone(), transport.clone())
        .await
        .expect("state should build");
    TestApp {
        state,
        repo,
        transport,
    }
}

fn build_app(state: AppState) -> axum::Router {
    hookline_server::api::router(state)
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn signed_request(uri: &str, scheme: &SignatureScheme, secret: &str, body: &str) -> Request<Body> {
    let header = scheme
        .sign(body.as_bytes(), &SecretString::new(secret.to_owned()))
        .unwrap();
    Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header(header.name, header.value)
        .header("X-Webhook-Event", "order.created")
        .header("X-Webhook-Delivery-Id", "dlv-1")
        .header("X-GitHub-Event", "push")
        .header("X-GitHub-Delivery", "gh-1")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

fn json_request(method: http::Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn empty_request(method: http::Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// -- Health ---------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, body) = send(&app.state, empty_request(http::Method::GET, "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queued_retries"], 0);
    assert_eq!(body["metrics"]["delivered"], 0);
}

// -- Receive --------------------------------------------------------------

#[tokio::test]
async fn signed_webhook_is_accepted_once() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let scheme = SignatureScheme::generic();

    let (status, first) = send(
        &app.state,
        signed_request("/receive/shop", &scheme, "shop-secret", r#"{"id":1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["event_type"], "order.created");
    assert_eq!(first["status"], "processed");
    assert_eq!(first["duplicate"], false);

    let (status, second) = send(
        &app.state,
        signed_request("/receive/provider/shop", &scheme, "shop-secret", r#"{"id":1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["event_id"], first["event_id"]);
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, body) = send(
        &app.state,
        signed_request(
            "/receive/shop",
            &SignatureScheme::generic(),
            "wrong-secret",
            r#"{"id":1}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("shop"));
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, _) = send(
        &app.state,
        signed_request("/receive/shop", &SignatureScheme::generic(), "shop-secret", "{oops"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_source_is_not_found() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, _) = send(
        &app.state,
        signed_request("/receive/nobody", &SignatureScheme::generic(), "x", "{}"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn forwarding_source_publishes_to_subscribers() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, body) = send(
        &app.state,
        signed_request(
            "/receive/github",
            &SignatureScheme::github(),
            "gh-secret",
            r#"{"ref":"refs/heads/main"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_type"], "push");

    app.state.dispatcher.shutdown().await;
    let requests = app.transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://crm.example.com/hooks");
    assert_eq!(requests[0].header("X-Webhook-Event"), Some("push"));
}

// -- Deliveries -----------------------------------------------------------

#[tokio::test]
async fn publish_then_inspect_delivery() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, body) = send(
        &app.state,
        json_request(
            http::Method::POST,
            "/v1/events",
            &json!({"event_type": "order.created", "payload": {"id": 9}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let ids = body["delivery_ids"].as_array().unwrap();
    assert_eq!(ids.len(), 1);
    let id = ids[0].as_str().unwrap().to_owned();

    app.state.dispatcher.shutdown().await;

    let (status, delivery) = send(
        &app.state,
        empty_request(http::Method::GET, &format!("/v1/deliveries/{id}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["status"], "success");
    assert_eq!(delivery["endpoint_id"], "crm");
    assert_eq!(delivery["subscription_id"], "pushes");
    assert!(delivery.get("secret").is_none());

    let (status, stats) = send(&app.state, empty_request(http::Method::GET, "/v1/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["deliveries"]["total"], 1);
    assert_eq!(stats["metrics"]["delivered"], 1);
}

#[tokio::test]
async fn publish_without_event_type_is_rejected() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, _) = send(
        &app.state,
        json_request(http::Method::POST, "/v1/events", &json!({"event_type": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_delivery_is_not_found() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let (status, _) = send(
        &app.state,
        empty_request(http::Method::GET, "/v1/deliveries/missing"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.state,
        empty_request(http::Method::POST, "/v1/deliveries/missing/retry"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retry_and_cancel_lifecycle() {
    let app = test_app(ScriptedTransport::statuses([500, 500])).await;
    let endpoint = app
        .repo
        .get_endpoint(&"crm".into())
        .await
        .unwrap()
        .unwrap();
    let delivery = app
        .state
        .dispatcher
        .delivery_for(&endpoint, "order.created", json!({}));
    let id = delivery.id.to_string();
    app.state.dispatcher.dispatch(delivery).await.unwrap();

    let (status, result) = send(
        &app.state,
        empty_request(http::Method::POST, &format!("/v1/deliveries/{id}/retry")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], "retrying");
    assert_eq!(result["attempts"], 2);

    let (status, result) = send(
        &app.state,
        json_request(
            http::Method::POST,
            &format!("/v1/deliveries/{id}/cancel"),
            &json!({"reason": "endpoint retired"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], "cancelled");

    let stored = app.repo.get_delivery(&id.as_str().into()).await.unwrap().unwrap();
    assert_eq!(stored.status, DeliveryStatus::Cancelled);
    assert_eq!(stored.cancel_reason.as_deref(), Some("endpoint retired"));

    let (status, _) = send(
        &app.state,
        empty_request(http::Method::POST, &format!("/v1/deliveries/{id}/retry")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app.state,
        empty_request(http::Method::POST, &format!("/v1/deliveries/{id}/cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn retry_while_attempt_in_flight_conflicts() {
    let app = test_app(ScriptedTransport::always(200)).await;
    let endpoint = app
        .repo
        .get_endpoint(&"crm".into())
        .await
        .unwrap()
        .unwrap();
    let delivery = app
        .state
        .dispatcher
        .delivery_for(&endpoint, "order.created", json!({}));
    let id = delivery.id.clone();
    app.repo.store_outgoing_delivery(&delivery).await.unwrap();
    app.repo.claim_delivery(&id).await.unwrap();

    let (status, body) = send(
        &app.state,
        empty_request(http::Method::POST, &format!("/v1/deliveries/{id}/retry")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("in flight"));
    assert_eq!(app.transport.calls(), 0);
}

// -- Circuit breakers -----------------------------------------------------

#[tokio::test]
async fn open_list_and_close_circuit() {
    let app = test_app(ScriptedTransport::always(200)).await;

    let (status, body) = send(
        &app.state,
        json_request(
            http::Method::POST,
            "/admin/circuit-breakers/open",
            &json!({"destination": "https://crm.example.com/hooks", "duration_seconds": 30}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["destination"], "https://crm.example.com");
    assert_eq!(body["state"], "open");

    let (status, body) = send(
        &app.state,
        empty_request(http::Method::GET, "/admin/circuit-breakers"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let breakers = body["circuit_breakers"].as_array().unwrap();
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0]["forced"], true);

    // While forced open, a publish is deferred without a network call.
    let (status, _) = send(
        &app.state,
        json_request(
            http::Method::POST,
            "/v1/events",
            &json!({"event_type": "push", "payload": {}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.state.dispatcher.shutdown().await;
    assert_eq!(app.transport.calls(), 0);

    let (status, body) = send(
        &app.state,
        json_request(
            http::Method::POST,
            "/admin/circuit-breakers/close",
            &json!({"destination": "https://crm.example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "closed");
}

#[tokio::test]
async fn circuit_admin_validates_input() {
    let app = test_app(ScriptedTransport::always(200)).await;

    let (status, _) = send(
        &app.state,
        json_request(
            http::Method::POST,
            "/admin/circuit-breakers/open",
            &json!({"destination": "https://crm.example.com", "duration_seconds": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.state,
        json_request(
            http::Method::POST,
            "/admin/circuit-breakers/close",
            &json!({"destination": "https://never-seen.example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
