//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack, proxy routes)
//!     → request.rs (query, cookie and value lookup helpers)
//!     → handler produces a Response
//!     → response.rs (adapt to the wire, inject trace token)
//!     → Send to client
//! ```

pub mod content_type;
pub mod request;
pub mod response;
pub mod server;

pub use response::{adapt, AdaptError, Headers, Response, ResponseBody};
pub use server::{AppState, HttpServer, ServerError};
