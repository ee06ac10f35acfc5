//! Trace-token propagation.
//!
//! # Responsibilities
//! - Read the inbound trace header into a [`TraceContext`] extension
//! - Optionally mint a UUID v4 token when the caller sent none
//! - Hand the context to handlers as an extractor
//!
//! The context is read-only once attached; the response adapter echoes the
//! token back as `X-Trace-Token`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::config::TraceConfig;

/// Response header echoing the active trace token.
pub const X_TRACE_TOKEN: &str = "X-Trace-Token";

/// Body field injected into JSON-object responses.
pub const TRACE_TOKEN_FIELD: &str = "x-trace-token";

/// Correlation data owned by the surrounding request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    trace_token: Option<String>,
}

impl TraceContext {
    pub fn new(trace_token: Option<String>) -> Self {
        Self { trace_token }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()))
    }

    pub fn trace_token(&self) -> Option<&str> {
        self.trace_token.as_deref()
    }
}

impl<S> FromRequestParts<S> for TraceContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<TraceContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Build the context for one request from its headers.
pub fn extract(headers: &axum::http::HeaderMap, config: &TraceConfig) -> TraceContext {
    let token = headers
        .get(config.header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            config
                .generate_when_missing
                .then(|| Uuid::new_v4().to_string())
        });

    TraceContext::new(token)
}

/// Middleware attaching a [`TraceContext`] to every request.
pub async fn attach_trace_context(
    State(config): State<Arc<TraceConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let context = extract(request.headers(), &config);
    tracing::trace!(trace_token = ?context.trace_token(), "Trace context attached");
    request.extensions_mut().insert(context);
    next.run(request).await
}
