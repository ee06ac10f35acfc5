//! Inbound request accessors.
//!
//! # Responsibilities
//! - Decode query parameters, preserving repeated keys
//! - Split `Cookie` headers into individual name/value pairs
//! - Look a value up across query, headers and JSON body
//!
//! # Design Decisions
//! - Query wins over headers, headers win over the body
//! - A body that is present but not a JSON object is a client error (400)

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, StatusCode, Uri},
};
use serde_json::{Map, Value};

use crate::failure::body::ResponseBodyError;
use crate::http::content_type;
use crate::http::response::{Response, ResponseBody};

/// Upper bound on the body read by [`value_from_request`].
pub const MAX_LOOKUP_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Query parameters in order of appearance.
pub fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// First value of query parameter `key`.
pub fn query_param(uri: &Uri, key: &str) -> Option<String> {
    query_pairs(uri)
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

/// Every cookie across all `Cookie` headers.
pub fn cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Find `key` in the query string, then the headers, then a JSON-object body.
///
/// Empty values are skipped. An empty body yields `Ok(None)`; a body that
/// cannot be read or is not a JSON object yields a 400 [`Response`].
pub async fn value_from_request(
    parts: &Parts,
    body: Body,
    key: &str,
) -> Result<Option<String>, Response> {
    if let Some(value) = query_param(&parts.uri, key).filter(|v| !v.is_empty()) {
        return Ok(Some(value));
    }

    if let Some(value) = parts
        .headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Ok(Some(value.to_string()));
    }

    let bytes = axum::body::to_bytes(body, MAX_LOOKUP_BODY_BYTES)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "Failed to read request body");
            invalid_request()
        })?;
    if bytes.is_empty() {
        return Ok(None);
    }

    let object: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "Request body is not a JSON object");
        invalid_request()
    })?;

    Ok(object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string))
}

fn invalid_request() -> Response {
    Response::json(StatusCode::BAD_REQUEST, &ResponseBodyError::invalid_request())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to encode invalid-request body");
            Response::new(StatusCode::BAD_REQUEST, ResponseBody::Empty)
        })
        .with_headers(content_type::json_headers())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_query_pairs_keep_repeats() {
        let uri: Uri = "/x?tag=a&tag=b&q=hello%20world".parse().unwrap();
        assert_eq!(
            query_pairs(&uri),
            vec![
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
                ("q".to_string(), "hello world".to_string()),
            ]
        );
        assert!(query_pairs(&"/x".parse().unwrap()).is_empty());
    }

    #[test]
    fn test_cookies_split() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "session=abc; theme=\"dark\"".parse().unwrap());
        headers.append(header::COOKIE, "lang=es; =broken; flag".parse().unwrap());

        assert_eq!(
            cookies(&headers),
            vec![
                ("session".to_string(), "abc".to_string()),
                ("theme".to_string(), "dark".to_string()),
                ("lang".to_string(), "es".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_query_wins_over_header_and_body() {
        let parts = parts("/x?tenant=q", &[("tenant", "h")]);
        let body = Body::from(r#"{"tenant":"b"}"#);
        assert_eq!(
            value_from_request(&parts, body, "tenant").await.unwrap(),
            Some("q".to_string())
        );
    }

    #[tokio::test]
    async fn test_header_then_body() {
        let parts_with_header = parts("/x", &[("tenant", "h")]);
        assert_eq!(
            value_from_request(&parts_with_header, Body::empty(), "tenant")
                .await
                .unwrap(),
            Some("h".to_string())
        );

        let bare = parts("/x?tenant=", &[]);
        let body = Body::from(r#"{"tenant":"b","count":3}"#);
        assert_eq!(
            value_from_request(&bare, body, "tenant").await.unwrap(),
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_body_and_non_string_values() {
        let bare = parts("/x", &[]);
        assert_eq!(value_from_request(&bare, Body::empty(), "k").await.unwrap(), None);
        assert_eq!(
            value_from_request(&bare, Body::from(r#"{"k":3}"#), "k").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let bare = parts("/x", &[]);
        for body in ["{not json", "[1,2]"] {
            let response = value_from_request(&bare, Body::from(body), "k")
                .await
                .unwrap_err();
            assert_eq!(response.status, StatusCode::BAD_REQUEST);
            assert_eq!(
                response.headers.get(content_type::CONTENT_TYPE_KEY).map(String::as_str),
                Some(content_type::JSON)
            );
            let ResponseBody::Json(body) = response.body else {
                panic!("expected JSON body");
            };
            assert_eq!(body["errorCode"], "INVALID_REQUEST");
        }
    }
}
