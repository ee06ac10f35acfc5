//! Request forwarding.
//!
//! # Flow
//! ```text
//! target template + captured route params
//!     → replace_path_params (":id" segments)
//!     → merge inbound query onto the target's own query
//!     → copy headers, re-attach cookies, stream the body
//!     → ClientProvider picks the client for the runtime environment
//!     → single upstream call
//!     → copy headers, status, then stream the upstream body back
//! ```
//!
//! # Design Decisions
//! - Single attempt, no retries; the first transport error is returned
//! - Bodies stream in both directions and are never buffered
//! - Dropping the outbound body (client went away) drops the upstream stream

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request},
};
use futures_util::TryStreamExt;
use thiserror::Error;
use url::Url;

use crate::http::request::{cookies, query_pairs};
use crate::observability::metrics;
use crate::proxy::client::{ClientProvider, RuntimeEnvironment};

/// Route parameters captured by the inbound router.
pub type PathParams = HashMap<String, String>;

/// Inbound headers that are not copied verbatim.
/// `host` comes from the target URL, `cookie` is rebuilt from parsed pairs,
/// and `transfer-encoding` is framing the upstream connection redoes itself.
const SKIPPED_REQUEST_HEADERS: [header::HeaderName; 3] =
    [header::HOST, header::COOKIE, header::TRANSFER_ENCODING];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid target URL '{url}': {source}")]
    InvalidTarget {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Substitute every `:name` segment of `template` with `params[name]`.
///
/// Only the part before any `?` or `#` is templated; the rest is kept as is.
/// Missing parameters become empty segments.
pub fn replace_path_params(template: &str, params: &PathParams) -> String {
    let split = template.find(&['?', '#'][..]).unwrap_or(template.len());
    let (path, rest) = template.split_at(split);

    let mut replaced = path
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => params.get(name).map(String::as_str).unwrap_or(""),
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/");
    replaced.push_str(rest);
    replaced
}

/// Append `inbound` query pairs after the target's own, keeping repeats.
pub fn merge_query(target: &mut Url, inbound: &[(String, String)]) {
    if inbound.is_empty() {
        return;
    }
    target.query_pairs_mut().extend_pairs(inbound);
}

/// Re-issues inbound requests against upstream services.
#[derive(Clone)]
pub struct Forwarder {
    clients: Arc<ClientProvider>,
}

impl Forwarder {
    pub fn new(clients: Arc<ClientProvider>) -> Self {
        Self { clients }
    }

    /// Forward `request` to `target_template` and return the upstream response.
    ///
    /// The request body is consumed, so a request can be forwarded once.
    pub async fn forward(
        &self,
        request: Request<Body>,
        params: &PathParams,
        target_template: &str,
        environment: &RuntimeEnvironment,
    ) -> Result<axum::response::Response, ForwardError> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.to_string();

        let resolved = replace_path_params(target_template, params);
        let mut target = Url::parse(&resolved).map_err(|source| ForwardError::InvalidTarget {
            url: resolved.clone(),
            source,
        })?;
        merge_query(&mut target, &query_pairs(&parts.uri));

        tracing::debug!(method = %method, target = %target, "Forwarding request");

        let client = self.clients.get_client(environment, &target).await;

        let mut builder = client
            .request(parts.method.clone(), target.clone())
            .headers(forwarded_headers(&parts.headers));

        let cookies = cookies(&parts.headers);
        if !cookies.is_empty() {
            let cookie_header = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie_header);
        }

        if has_body(&parts.headers) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = client.execute(builder).await.map_err(|e| {
            metrics::record_forward_error(&method);
            tracing::error!(method = %method, target = %target, error = %e, "Upstream error");
            e
        })?;

        let status = upstream.status();
        metrics::record_forward(&method, status.as_u16(), start);
        tracing::debug!(
            method = %method,
            target = %target,
            status = status.as_u16(),
            "Upstream responded"
        );

        let mut response = axum::response::Response::new(Body::empty());
        *response.status_mut() = status;
        let headers = response.headers_mut();
        for (name, value) in upstream.headers() {
            if name != header::TRANSFER_ENCODING {
                headers.append(name.clone(), value.clone());
            }
        }

        let target_for_log = target.to_string();
        let stream = upstream.bytes_stream().inspect_err(move |e| {
            tracing::warn!(target = %target_for_log, error = %e, "Upstream body stream failed");
        });
        *response.body_mut() = Body::from_stream(stream);

        Ok(response)
    }
}

fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if !SKIPPED_REQUEST_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|len| len > 0)
}
