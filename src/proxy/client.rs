//! Environment-aware upstream clients.
//!
//! # Responsibilities
//! - Map a runtime-environment identifier to the client upstream calls use
//! - On managed runtimes, attach an identity token to every request
//! - Share one client per environment (and audience) across all requests
//!
//! # Design Decisions
//! - Clients are built lazily behind a per-key initialization barrier, so
//!   concurrent first requests mint a single token
//! - A token older than the configured TTL causes the entry to be rebuilt
//! - Failing to mint a token aborts the request with a panic; a broken trust
//!   boundary never degrades to unauthenticated calls

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder};
use tokio::sync::OnceCell;
use url::Url;

use crate::config::{RuntimeConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::proxy::identity::{IdentityError, IdentityToken, MetadataIdentity};

/// Identifier for Cloud Run workloads.
pub const GCP_CLOUD_RUN: &str = "gcp-cloud-run";

/// Identifier for App Engine workloads.
pub const GCP_APP_ENGINE: &str = "gcp-app-engine";

/// The hosting platform, as declared by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeEnvironment {
    CloudRun,
    AppEngine,
    Other(String),
}

impl RuntimeEnvironment {
    /// Whether upstream calls from this platform need identity tokens.
    pub fn is_managed(&self) -> bool {
        matches!(self, RuntimeEnvironment::CloudRun | RuntimeEnvironment::AppEngine)
    }

    pub fn as_str(&self) -> &str {
        match self {
            RuntimeEnvironment::CloudRun => GCP_CLOUD_RUN,
            RuntimeEnvironment::AppEngine => GCP_APP_ENGINE,
            RuntimeEnvironment::Other(name) => name,
        }
    }
}

impl From<&str> for RuntimeEnvironment {
    fn from(value: &str) -> Self {
        match value {
            GCP_CLOUD_RUN => RuntimeEnvironment::CloudRun,
            GCP_APP_ENGINE => RuntimeEnvironment::AppEngine,
            other => RuntimeEnvironment::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shared HTTP client, optionally carrying an identity token.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    identity: Option<IdentityToken>,
}

impl UpstreamClient {
    pub fn plain(http: reqwest::Client) -> Self {
        Self { http, identity: None }
    }

    pub fn authenticated(http: reqwest::Client, identity: IdentityToken) -> Self {
        Self {
            http,
            identity: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Send `builder`, replacing any `Authorization` header with the identity token.
    pub async fn execute(&self, builder: RequestBuilder) -> reqwest::Result<reqwest::Response> {
        let mut request = builder.build()?;
        if let Some(identity) = &self.identity {
            request
                .headers_mut()
                .insert(AUTHORIZATION, identity.authorization().clone());
        }
        self.http.execute(request).await
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.identity
            .as_ref()
            .map_or(true, |identity| identity.age() < ttl)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    environment: RuntimeEnvironment,
    audience: Option<String>,
}

type ClientSlot = Arc<OnceCell<Arc<UpstreamClient>>>;

/// Hands out upstream clients by runtime environment.
pub struct ClientProvider {
    base: reqwest::Client,
    identity: MetadataIdentity,
    token_ttl: Duration,
    cache: DashMap<ClientKey, ClientSlot>,
}

impl ClientProvider {
    pub fn new(runtime: &RuntimeConfig, timeouts: &TimeoutConfig) -> Result<Self, IdentityError> {
        let base = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;
        let identity = MetadataIdentity::new(
            runtime.identity_endpoint.clone(),
            Duration::from_secs(runtime.identity_timeout_secs),
        )?;

        Ok(Self {
            base,
            identity,
            token_ttl: Duration::from_secs(runtime.token_ttl_secs),
            cache: DashMap::new(),
        })
    }

    /// Client for calls to `target` from `environment`.
    ///
    /// # Panics
    /// Panics with the [`IdentityError`] as payload when a managed runtime
    /// cannot mint an identity token.
    pub async fn get_client(
        &self,
        environment: &RuntimeEnvironment,
        target: &Url,
    ) -> Arc<UpstreamClient> {
        match self.try_get_client(environment, target).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(
                    environment = %environment,
                    target = %target,
                    error = %e,
                    "Identity token authentication failed"
                );
                std::panic::panic_any(e)
            }
        }
    }

    /// Fallible form of [`get_client`](Self::get_client).
    pub async fn try_get_client(
        &self,
        environment: &RuntimeEnvironment,
        target: &Url,
    ) -> Result<Arc<UpstreamClient>, IdentityError> {
        let key = ClientKey {
            environment: environment.clone(),
            audience: environment.is_managed().then(|| audience_for(target)),
        };

        loop {
            let slot = self.cache.entry(key.clone()).or_default().clone();
            let client = slot.get_or_try_init(|| self.build(&key)).await?.clone();
            if client.is_fresh(self.token_ttl) {
                return Ok(client);
            }

            tracing::debug!(environment = %environment, "Identity token expired, re-minting");
            self.cache
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));
        }
    }

    /// Number of cached clients.
    pub fn cached_clients(&self) -> usize {
        self.cache.len()
    }

    async fn build(&self, key: &ClientKey) -> Result<Arc<UpstreamClient>, IdentityError> {
        let Some(audience) = &key.audience else {
            return Ok(Arc::new(UpstreamClient::plain(self.base.clone())));
        };

        let started = Instant::now();
        let result = self.identity.mint(audience).await;
        metrics::record_identity_token(result.is_ok());
        let token = result?;

        tracing::info!(
            environment = %key.environment,
            audience = %audience,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Identity token minted"
        );
        Ok(Arc::new(UpstreamClient::authenticated(self.base.clone(), token)))
    }
}

/// Token audience for `target`: its origin.
pub fn audience_for(target: &Url) -> String {
    target.origin().ascii_serialization()
}
