//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use request_relay::config::{RelayConfig, RouteConfig};
use request_relay::HttpServer;

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A local address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Upstream that reports back what it received as JSON.
///
/// `/teapot` answers 418 with an `x-upstream` header instead.
pub async fn start_echo_backend() -> SocketAddr {
    let router = Router::new()
        .route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, [("x-upstream", "kettle")], "short and stout") }),
        )
        .fallback(echo);
    serve(router).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        seen.entry(name.to_string())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": seen,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Stand-in for the metadata server's identity endpoint.
pub struct MetadataServer {
    pub endpoint: String,
    pub calls: Arc<AtomicU32>,
}

impl MetadataServer {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Mints `token-for-<audience>`, or fails with `failure_status` when set.
pub async fn start_metadata_server(failure_status: Option<StatusCode>) -> MetadataServer {
    let calls = Arc::new(AtomicU32::new(0));
    let state = (calls.clone(), failure_status);

    let router = Router::new()
        .route("/identity", get(mint))
        .with_state(state);
    let addr = serve(router).await;

    MetadataServer {
        endpoint: format!("http://{}/identity", addr),
        calls,
    }
}

async fn mint(
    State((calls, failure_status)): State<(Arc<AtomicU32>, Option<StatusCode>)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    calls.fetch_add(1, Ordering::SeqCst);

    if headers.get("metadata-flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
        return (StatusCode::FORBIDDEN, "missing Metadata-Flavor".to_string());
    }
    if let Some(status) = failure_status {
        return (status, "metadata unavailable".to_string());
    }
    if params.get("format").map(String::as_str) != Some("full") {
        return (StatusCode::BAD_REQUEST, "format must be full".to_string());
    }

    let audience = params.get("audience").cloned().unwrap_or_default();
    (StatusCode::OK, format!("token-for-{}", audience))
}

pub fn route(name: &str, path: &str, target: String) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        path: path.into(),
        target,
    }
}

/// Config for a relay with `routes`, listening anywhere.
pub fn relay_config(routes: Vec<RouteConfig>) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.routes = routes;
    config
}

/// Run a relay for `config` with `app` merged in; returns its address.
pub async fn spawn_relay(config: RelayConfig, app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap().merge(app);
    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });
    addr
}

/// Client that bypasses any system proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
