//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Hosting platform and upstream authentication.
    pub runtime: RuntimeConfig,

    /// What recovered failures expose to clients.
    pub errors: ErrorReportingConfig,

    /// Trace-token propagation.
    pub trace: TraceConfig,

    /// Proxy routes mapping inbound paths to upstream URL templates.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Runtime environment and identity-token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Hosting platform identifier, e.g. "gcp-cloud-run" or "local".
    pub environment: String,

    /// Metadata endpoint that mints identity tokens.
    pub identity_endpoint: String,

    /// Age after which a cached identity token is re-minted, in seconds.
    pub token_ttl_secs: u64,

    /// Timeout for a single identity-token request, in seconds.
    pub identity_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: "local".to_string(),
            identity_endpoint: DEFAULT_IDENTITY_ENDPOINT.to_string(),
            token_ttl_secs: 3000,
            identity_timeout_secs: 5,
        }
    }
}

pub const DEFAULT_IDENTITY_ENDPOINT: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";

/// How a recovered panic is escalated after the 500 is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PanicPolicy {
    /// Error log and metric only.
    #[default]
    Log,
    /// Also start a graceful shutdown.
    Shutdown,
}

/// Error-body exposure settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorReportingConfig {
    /// Substring identifying the application's own stack frames.
    pub module_name: String,

    /// Replace the generic message with the panic's own message.
    pub include_message: bool,

    /// Attach the parsed stack. May leak internal paths.
    pub include_stack: bool,

    pub on_panic: PanicPolicy,
}

impl Default for ErrorReportingConfig {
    fn default() -> Self {
        Self {
            module_name: env!("CARGO_CRATE_NAME").to_string(),
            include_message: false,
            include_stack: false,
            on_panic: PanicPolicy::Log,
        }
    }
}

/// Trace-token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Inbound header carrying the token.
    pub header: String,

    /// Mint a UUID v4 token when the header is absent.
    pub generate_when_missing: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            header: "X-Trace-Token".to_string(),
            generate_when_missing: false,
        }
    }
}

/// A proxied route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Inbound path in router syntax, e.g. "/users/{id}".
    pub path: String,

    /// Upstream URL template; `:name` segments take the captured parameter.
    pub target: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "request_relay=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
