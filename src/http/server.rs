//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with configured proxy routes and `/health`
//! - Merge application handlers under the same middleware stack
//! - Wire up middleware (tracing, timeout, trace context, panic recovery)
//! - Serve with graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::HEALTH_PATH;
use crate::config::{RelayConfig, RouteConfig};
use crate::failure::body::{ResponseBodyError, BAD_GATEWAY_CODE};
use crate::failure::recovery::{recover_panics, supervisor_for, ErrorRecovery};
use crate::http::content_type;
use crate::http::response::{adapt, Response, ResponseBody};
use crate::lifecycle::{signals::shutdown_signal, Shutdown};
use crate::observability::trace_context::{attach_trace_context, TraceContext};
use crate::proxy::client::{ClientProvider, RuntimeEnvironment};
use crate::proxy::forwarder::{Forwarder, PathParams};
use crate::proxy::identity::IdentityError;

/// Message sent when a configured route cannot reach its upstream.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Upstream request failed.";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] IdentityError),

    #[error("server IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into proxy handlers.
#[derive(Clone)]
pub struct AppState {
    pub forwarder: Forwarder,
    pub environment: RuntimeEnvironment,
}

/// HTTP server for the relay.
pub struct HttpServer {
    config: RelayConfig,
    routes: Router,
    forwarder: Forwarder,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: RelayConfig) -> Result<Self, ServerError> {
        let clients = Arc::new(ClientProvider::new(&config.runtime, &config.timeouts)?);
        let forwarder = Forwarder::new(clients);

        let state = AppState {
            forwarder: forwarder.clone(),
            environment: RuntimeEnvironment::from(config.runtime.environment.as_str()),
        };

        tracing::info!(
            environment = %state.environment,
            managed = state.environment.is_managed(),
            routes = config.routes.len(),
            "Relay configured"
        );

        let routes = Self::proxy_routes(&config.routes, state);
        Ok(Self {
            config,
            routes,
            forwarder,
            shutdown: Shutdown::new(),
        })
    }

    /// Mount application handlers alongside the proxy routes.
    pub fn merge(mut self, app: Router) -> Self {
        self.routes = self.routes.merge(app);
        self
    }

    /// Forwarder for application handlers that proxy on their own.
    pub fn forwarder(&self) -> Forwarder {
        self.forwarder.clone()
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    fn proxy_routes(routes: &[RouteConfig], state: AppState) -> Router {
        let mut router = Router::new().route(HEALTH_PATH, get(health));

        for route in routes {
            let route = Arc::new(route.clone());
            let path = route.path.clone();
            router = router.route(
                &path,
                any(
                    move |State(state): State<AppState>,
                          params: Option<Path<PathParams>>,
                          trace: TraceContext,
                          request: Request<Body>| {
                        let route = route.clone();
                        async move {
                            let params = params.map(|Path(params)| params).unwrap_or_default();
                            proxy_handler(state, route, params, trace, request).await
                        }
                    },
                ),
            );
        }

        router.with_state(state)
    }

    /// Final router with the full middleware stack applied.
    #[allow(deprecated)]
    pub fn into_router(self) -> Router {
        let supervisor = supervisor_for(self.config.errors.on_panic, &self.shutdown);
        let recovery = Arc::new(ErrorRecovery::new(&self.config.errors, supervisor));
        let trace_config = Arc::new(self.config.trace.clone());

        self.routes
            .layer(middleware::from_fn_with_state(recovery, recover_panics))
            .layer(middleware::from_fn_with_state(trace_config, attach_trace_context))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        // Held for the whole serve so the trigger channel stays open.
        let shutdown = self.shutdown.clone();
        let trigger = shutdown.subscribe();
        let app = self.into_router();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(trigger))
            .await?;
        drop(shutdown);

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health(trace: TraceContext) -> axum::response::Response {
    let body = serde_json::json!({ "status": "ok" });
    let response = Response::new(StatusCode::OK, ResponseBody::Json(body));
    adapt(Some(&trace), response)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

/// Forward to the route's target; transport failures become a 502 body.
async fn proxy_handler(
    state: AppState,
    route: Arc<RouteConfig>,
    params: PathParams,
    trace: TraceContext,
    request: Request<Body>,
) -> axum::response::Response {
    match state
        .forwarder
        .forward(request, &params, &route.target, &state.environment)
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(route = %route.name, error = %e, "Forwarding failed");
            let body = ResponseBodyError::new(UPSTREAM_FAILURE_MESSAGE, BAD_GATEWAY_CODE);
            match Response::json(StatusCode::BAD_GATEWAY, &body) {
                Ok(response) => {
                    let response = response.with_headers(content_type::json_headers());
                    adapt(Some(&trace), response)
                        .await
                        .unwrap_or_else(IntoResponse::into_response)
                }
                Err(err) => err.into_response(),
            }
        }
    }
}
