//! Panic recovery, validation mapping and trace tokens through the full stack.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use request_relay::config::{PanicPolicy, RelayConfig};
use request_relay::failure::validation::{validation_failure_response, FieldViolation, ValidationErrors};
use request_relay::http::{adapt, Response};
use request_relay::observability::trace_context::TraceContext;
use request_relay::HttpServer;

fn app() -> Router {
    Router::new()
        .route("/boom", get(boom))
        .route("/signup", post(signup))
        .route("/broken", post(broken))
}

async fn boom() -> &'static str {
    panic!("index out of bounds")
}

fn signup_messages() -> HashMap<String, String> {
    HashMap::from([(
        "user.email.required".to_string(),
        "Email is required".to_string(),
    )])
}

async fn respond(
    trace: &TraceContext,
    result: Result<Response, Box<dyn StdError + Send + Sync>>,
) -> axum::response::Response {
    let response = match result {
        Ok(response) => Ok(response),
        Err(err) => validation_failure_response(err, &signup_messages()),
    };
    match response {
        Ok(response) => adapt(Some(trace), response)
            .await
            .unwrap_or_else(IntoResponse::into_response),
        Err(e) => e.into_response(),
    }
}

async fn signup(trace: TraceContext) -> axum::response::Response {
    let errors: ValidationErrors = [
        FieldViolation::new("SignupRequest.user.email", "Email", "required"),
        FieldViolation::new("SignupRequest.user.age", "Age", "gte"),
    ]
    .into_iter()
    .collect();
    respond(&trace, Err(Box::new(errors))).await
}

async fn broken(trace: TraceContext) -> axum::response::Response {
    let err = io::Error::new(io::ErrorKind::Other, "validator crashed");
    respond(&trace, Err(Box::new(err))).await
}

fn router(config: RelayConfig) -> Router {
    HttpServer::new(config).unwrap().merge(app()).into_router()
}

async fn call(router: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_panic_becomes_generic_500() {
    let (status, headers, body) = call(router(RelayConfig::default()), get_request("/boom")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(body["errorCode"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["message"], "We are having trouble responding to your request.");
    assert!(body.get("stack").is_none());
}

#[tokio::test]
async fn test_panic_details_when_enabled() {
    let mut config = RelayConfig::default();
    config.errors.include_message = true;
    config.errors.include_stack = true;
    config.errors.module_name = "recovery::boom".into();

    let (status, _, body) = call(router(config), get_request("/boom")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "index out of bounds");
    let frames = body["stack"].as_array().expect("stack should be present");
    assert!(!frames.is_empty());
    for frame in frames {
        assert!(frame["file"].is_string());
        assert!(frame["funcName"].is_string());
    }
    let top = frames[0]["funcName"].as_str().unwrap();
    assert!(top.contains("recovery::boom"), "unexpected top frame {}", top);
    assert!(frames
        .iter()
        .all(|frame| !frame["funcName"].as_str().unwrap().contains("install_panic_hook")));
}

#[tokio::test]
async fn test_panic_carries_trace_token() {
    let request = Request::builder()
        .uri("/boom")
        .header("X-Trace-Token", "trace-500")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = call(router(RelayConfig::default()), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers["x-trace-token"], "trace-500");
    assert_eq!(body["x-trace-token"], "trace-500");
}

#[tokio::test]
async fn test_generated_trace_token() {
    let mut config = RelayConfig::default();
    config.trace.generate_when_missing = true;

    let (_, headers, body) = call(router(config), get_request("/health")).await;

    let token = headers["x-trace-token"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&token).is_ok());
    assert_eq!(body["x-trace-token"], token);
}

#[tokio::test]
async fn test_shutdown_policy_triggers_shutdown() {
    let mut config = RelayConfig::default();
    config.errors.on_panic = PanicPolicy::Shutdown;

    let server = HttpServer::new(config).unwrap().merge(app());
    let mut shutdown = server.shutdown().subscribe();
    let router = server.into_router();

    let (status, _, _) = call(router, get_request("/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(shutdown.try_recv().is_ok());
}

#[tokio::test]
async fn test_validation_errors_become_422() {
    let request = Request::builder()
        .method("POST")
        .uri("/signup")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = call(router(RelayConfig::default()), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(
        body["errors"],
        serde_json::json!([
            {"property": "Email", "path": "user.email", "rule": "required", "message": "Email is required"},
            {"property": "Age", "path": "user.age", "rule": "gte"}
        ])
    );
}

#[tokio::test]
async fn test_non_validation_failure_reaches_recovery() {
    let mut config = RelayConfig::default();
    config.errors.include_message = true;

    let request = Request::builder()
        .method("POST")
        .uri("/broken")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = call(router(config), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "validator crashed");
}
