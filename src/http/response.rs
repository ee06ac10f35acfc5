//! Response model and its translation onto the wire.
//!
//! # Responsibilities
//! - Framework-agnostic [`Response`] value produced by handlers and error paths
//! - Apply declared headers, echo the trace token, dispatch by body shape
//! - Stream file attachments without buffering
//!
//! # Design Decisions
//! - The body is a closed tagged union; dispatch is an exhaustive match
//! - Header keys are a map, so duplicate keys cannot be represented
//! - Trace-token injection only touches JSON-object bodies; the header is
//!   set regardless of body shape

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::http::content_type;
use crate::observability::trace_context::{TraceContext, TRACE_TOKEN_FIELD, X_TRACE_TOKEN};

/// Header names to values; last write wins.
pub type Headers = BTreeMap<String, String>;

/// Response body shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body; encoded as JSON `null`.
    Empty,
    /// Written verbatim, no content type forced.
    Text(String),
    /// Written with whatever `Content-Type` the headers declare.
    Bytes(Bytes),
    /// JSON-encoded; defaults the content type to `application/json`.
    Json(Value),
    /// Streamed from disk as an attachment. Status, headers and trace token
    /// are not applied to this shape.
    File { path: PathBuf, file_name: String },
}

/// An application-level result prior to wire serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body,
        }
    }

    /// Serialize `value` into a JSON body.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Self, AdaptError> {
        Ok(Self::new(status, ResponseBody::Json(serde_json::to_value(value)?)))
    }

    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::new(status, ResponseBody::Text(text.into()))
    }

    pub fn bytes(status: StatusCode, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self::new(status, ResponseBody::Bytes(bytes.into()))
            .with_headers(content_type::headers(content_type))
    }

    pub fn file(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self::new(
            StatusCode::OK,
            ResponseBody::File {
                path: path.into(),
                file_name: file_name.into(),
            },
        )
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Errors raised while writing a [`Response`] to the wire.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("failed to open attachment {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode JSON body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid header name: {0}")]
    HeaderName(String),

    #[error("invalid value for header {0}")]
    HeaderValue(String),
}

impl IntoResponse for AdaptError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(error = %self, "Failed to write response");
        let status = match &self {
            AdaptError::File { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.into_response()
    }
}

/// Write `response` as a wire response, echoing `trace`'s token if any.
pub async fn adapt(
    trace: Option<&TraceContext>,
    response: Response,
) -> Result<axum::response::Response, AdaptError> {
    let Response {
        status,
        headers,
        body,
    } = response;
    let token = trace.and_then(TraceContext::trace_token);

    let (wire_body, is_json) = match body {
        ResponseBody::File { path, file_name } => return attachment(path, &file_name).await,
        ResponseBody::Text(text) => (Body::from(text), false),
        ResponseBody::Bytes(bytes) => (Body::from(bytes), false),
        ResponseBody::Empty => (Body::from(serde_json::to_vec(&Value::Null)?), true),
        ResponseBody::Json(mut value) => {
            if let Some(token) = token {
                inject_trace_token(&mut value, token);
            }
            (Body::from(serde_json::to_vec(&value)?), true)
        }
    };

    let mut wire_headers = to_header_map(&headers)?;
    if let Some(token) = token {
        let value =
            HeaderValue::from_str(token).map_err(|_| AdaptError::HeaderValue(X_TRACE_TOKEN.into()))?;
        wire_headers.insert(HeaderName::from_static("x-trace-token"), value);
    }
    if is_json {
        wire_headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(content_type::JSON));
    }

    let mut wire = axum::response::Response::new(wire_body);
    *wire.status_mut() = status;
    *wire.headers_mut() = wire_headers;
    Ok(wire)
}

/// Add the trace token to a JSON object; other JSON shapes are left alone.
pub fn inject_trace_token(value: &mut Value, token: &str) {
    if let Value::Object(map) = value {
        map.insert(TRACE_TOKEN_FIELD.to_string(), Value::String(token.to_string()));
    }
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, AdaptError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AdaptError::HeaderName(name.clone()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| AdaptError::HeaderValue(name.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}

async fn attachment(path: PathBuf, file_name: &str) -> Result<axum::response::Response, AdaptError> {
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|source| AdaptError::File {
            path: path.clone(),
            source,
        })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name.replace('\\', "\\\\").replace('"', "\\\"")
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|_| AdaptError::HeaderValue(header::CONTENT_DISPOSITION.to_string()))?;

    let mut wire = axum::response::Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = wire.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type::for_file_name(file_name)),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    tracing::debug!(path = %path.display(), file_name = %file_name, "Streaming attachment");
    Ok(wire)
}
