//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (timeouts > 0, addresses parse)
//! - Check route definitions (unique names, absolute paths, usable targets)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ConfigViolation>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{RelayConfig, RouteConfig};

/// Path served by the built-in liveness handler.
pub const HEALTH_PATH: &str = "/health";

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// Dotted location of the offending value.
    pub field: String,
    pub message: String,
}

impl ConfigViolation {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config`, collecting every violation.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ConfigViolation>> {
    let mut violations = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        violations.push(ConfigViolation::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        violations.push(ConfigViolation::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.runtime.token_ttl_secs == 0 {
        violations.push(ConfigViolation::new("runtime.token_ttl_secs", "must be greater than 0"));
    }

    if Url::parse(&config.runtime.identity_endpoint).is_err() {
        violations.push(ConfigViolation::new(
            "runtime.identity_endpoint",
            "must be an absolute URL",
        ));
    }

    if config.trace.header.is_empty() {
        violations.push(ConfigViolation::new("trace.header", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        violations.push(ConfigViolation::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut names = HashSet::new();
    let mut paths = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        validate_route(i, route, &mut names, &mut violations);
        if !paths.insert(route.path.as_str()) {
            violations.push(ConfigViolation::new(
                format!("routes[{}].path", i),
                format!("duplicate route path '{}'", route.path),
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn validate_route<'a>(
    index: usize,
    route: &'a RouteConfig,
    names: &mut HashSet<&'a str>,
    violations: &mut Vec<ConfigViolation>,
) {
    let field = |name: &str| format!("routes[{}].{}", index, name);

    if route.name.is_empty() {
        violations.push(ConfigViolation::new(field("name"), "must not be empty"));
    } else if !names.insert(route.name.as_str()) {
        violations.push(ConfigViolation::new(
            field("name"),
            format!("duplicate route name '{}'", route.name),
        ));
    }

    if !route.path.starts_with('/') {
        violations.push(ConfigViolation::new(field("path"), "must start with '/'"));
    }
    if route.path == HEALTH_PATH {
        violations.push(ConfigViolation::new(field("path"), "'/health' is reserved"));
    }
    if route.path.split('/').any(|segment| segment.starts_with(':') || segment.starts_with('*')) {
        violations.push(ConfigViolation::new(
            field("path"),
            "captures are written as '{name}' or '{*name}'",
        ));
    }

    // Parameters are only known per request; check the template with placeholders.
    let probe: Vec<&str> = route
        .target
        .split('/')
        .map(|segment| if segment.starts_with(':') { "param" } else { segment })
        .collect();
    match Url::parse(&probe.join("/")) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => violations.push(ConfigViolation::new(
            field("target"),
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => violations.push(ConfigViolation::new(
            field("target"),
            format!("'{}' is not a URL template: {}", route.target, e),
        )),
    }
}
