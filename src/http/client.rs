//! Outbound HTTP calls for one configured client.
//!
//! # Responsibilities
//! - Resolve request paths against the client's base URL
//! - Tag every request with a fresh `x-request-id`
//! - Translate transport errors and error statuses into `CallFailure`
//! - Log request and response lines when the client has logging enabled
//! - Build the transport from the client's pool and TLS settings
//!
//! # Design Decisions
//! - No timeout on the `reqwest::Client`; deadlines come from the guard
//! - TLS files are read once at construction; a missing file fails the build
//! - Any non-2xx status is a failure carrying the response body

use reqwest::header::HeaderValue;
use reqwest::{Certificate, Identity};
use std::fs;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError, TlsConfig, ValidationError};
use crate::resilience::CallFailure;

/// Header carrying the per-request identifier.
pub const X_REQUEST_ID: &str = "x-request-id";

/// HTTP client bound to one named backend.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    name: String,
    base_url: Url,
    enable_logging: bool,
    client: reqwest::Client,
}

impl HttpInvoker {
    /// Build an invoker with a dedicated `reqwest::Client` shaped by `config`.
    pub fn new(name: impl Into<String>, config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = build_client(config)?;
        Self::with_client(name, config, client)
    }

    /// Build on a caller-supplied `reqwest::Client` (shared pools, custom TLS).
    pub fn with_client(
        name: impl Into<String>,
        config: &ClientConfig,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConfigError::Validation(vec![ValidationError::ClientUrl {
                name: name.clone(),
                reason: e.to_string(),
            }])
        })?;
        Ok(Self {
            name,
            base_url,
            enable_logging: config.enable_logging,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` relative to the base URL and return the body.
    pub async fn get(&self, path: &str) -> Result<String, CallFailure> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| CallFailure::InvalidRequest(format!("bad path '{}': {}", path, e)))?;
        let request_id = Uuid::new_v4().to_string();
        let header = HeaderValue::from_str(&request_id)
            .map_err(|e| CallFailure::InvalidRequest(e.to_string()))?;

        if self.enable_logging {
            tracing::info!(
                client = %self.name,
                request_id = %request_id,
                method = "GET",
                url = %url,
                "Outbound request"
            );
        }

        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .header(X_REQUEST_ID, header)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(client = %self.name, request_id = %request_id, error = %e, "Transport error");
                CallFailure::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CallFailure::Transport(e.to_string()))?;

        if self.enable_logging {
            tracing::info!(
                client = %self.name,
                request_id = %request_id,
                status = status.as_u16(),
                latency_ms = started.elapsed().as_millis() as u64,
                "Inbound response"
            );
        }

        if !status.is_success() {
            return Err(CallFailure::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Transport for one client: pool limits plus optional trust roots and identity.
fn build_client(config: &ClientConfig) -> Result<reqwest::Client, ConfigError> {
    let pool = &config.connection_pool;
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .pool_idle_timeout(pool.idle_timeout());

    if let Some(tls) = &config.tls {
        builder = apply_tls(builder, tls)?;
    }
    Ok(builder.build()?)
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder, ConfigError> {
    if let Some(path) = &tls.ca_cert_path {
        let pem = fs::read(path)?;
        for cert in Certificate::from_pem_bundle(&pem)? {
            builder = builder.add_root_certificate(cert);
        }
        tracing::debug!(path = %path.display(), "Loaded trust roots");
    }
    if let Some(path) = &tls.identity_path {
        let archive = fs::read(path)?;
        builder = builder.identity(Identity::from_pkcs12_der(&archive, &tls.identity_password)?);
        tracing::debug!(path = %path.display(), "Loaded client identity");
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> ClientConfig {
        ClientConfig {
            base_url: base_url.to_string(),
            enable_logging: false,
            ..ClientConfig::default()
        }
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        let err = HttpInvoker::new("broken", &client("not a url")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
    }

    #[test]
    fn test_path_resolution() {
        let invoker = HttpInvoker::new("orders", &client("http://127.0.0.1:8080/api/")).unwrap();
        assert_eq!(invoker.name(), "orders");
        assert_eq!(
            invoker.base_url().join("orders/7").unwrap().as_str(),
            "http://127.0.0.1:8080/api/orders/7"
        );
    }

    #[test]
    fn test_missing_trust_roots_fail_construction() {
        let mut config = client("https://payments.internal");
        config.tls = Some(TlsConfig {
            ca_cert_path: Some(std::env::temp_dir().join("rest-resilience-missing-ca.pem")),
            ..TlsConfig::default()
        });
        let err = HttpInvoker::new("payments", &config).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_pool_settings_build() {
        let mut config = client("http://127.0.0.1:8080");
        config.connection_pool.max_idle_per_host = 0;
        config.connection_pool.idle_timeout_ms = 1_000;
        assert!(HttpInvoker::new("orders", &config).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let invoker = HttpInvoker::new("gone", &client(&format!("http://{}", addr))).unwrap();
        let err = invoker.get("/health").await.unwrap_err();
        assert!(matches!(err, CallFailure::Transport(_)));
    }
}
