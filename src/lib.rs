//! Request relay library.
//!
//! Panic recovery, response adaptation and environment-aware request
//! forwarding for Axum services.

pub mod config;
pub mod failure;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
