//! Content-type table shared by the response paths.

use std::path::Path;

use crate::http::response::Headers;

pub const CONTENT_TYPE_KEY: &str = "Content-Type";

pub const JSON: &str = "application/json";
pub const HTML: &str = "text/html";
pub const EXCEL: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const PDF: &str = "application/pdf";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Single-entry header map carrying `content_type`.
pub fn headers(content_type: &str) -> Headers {
    Headers::from([(CONTENT_TYPE_KEY.to_string(), content_type.to_string())])
}

pub fn json_headers() -> Headers {
    headers(JSON)
}

/// Content type for an attachment, chosen by extension.
pub fn for_file_name(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => JSON,
        Some("html") | Some("htm") => HTML,
        Some("xlsx") => EXCEL,
        Some("pdf") => PDF,
        _ => OCTET_STREAM,
    }
}
