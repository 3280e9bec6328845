//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the resilience layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Circuit breaker settings, shared by every named client.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Token bucket settings, shared by every named client.
    pub rate_limit: RateLimitConfig,

    /// Adaptive timeout settings.
    pub timeouts: TimeoutConfig,

    /// Retry/backoff settings.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Named HTTP clients.
    pub clients: BTreeMap<String, ClientConfig>,
}

/// A named outbound client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    /// Base URL that request paths are joined onto.
    pub base_url: String,

    /// Log each request line and response status.
    #[serde(default = "default_enable_logging")]
    pub enable_logging: bool,

    /// Keep-alive pool settings for this client's connections.
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    /// Custom trust roots and client identity; system defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

fn default_enable_logging() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            enable_logging: default_enable_logging(),
            connection_pool: ConnectionPoolConfig::default(),
            tls: None,
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    /// Idle connections kept open per host. Zero disables reuse.
    pub max_idle_per_host: usize,

    /// How long an idle connection may stay pooled, in milliseconds.
    pub idle_timeout_ms: u64,
}

impl ConnectionPoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout_ms: 60_000,
        }
    }
}

/// TLS material for one client.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle of extra root certificates to trust.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,

    /// PKCS#12 archive holding the client certificate and private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_path: Option<PathBuf>,

    /// Password protecting the PKCS#12 archive.
    pub identity_password: String,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Time after the last failure before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Time a probe may stay in flight before another caller can take over, in milliseconds.
    pub half_open_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn half_open_timeout(&self) -> Duration {
        Duration::from_millis(self.half_open_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            half_open_timeout_ms: 30_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Tokens added per elapsed second.
    pub permits_per_second: u32,

    /// Bucket capacity expressed in seconds of refill.
    pub max_burst_seconds: u32,
}

impl RateLimitConfig {
    /// Bucket capacity in tokens.
    pub fn capacity(&self) -> u64 {
        u64::from(self.permits_per_second) * u64::from(self.max_burst_seconds)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permits_per_second: 10,
            max_burst_seconds: 1,
        }
    }
}

/// Adaptive timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Starting timeout for a newly seen operation, in milliseconds.
    pub default_ms: u64,

    /// Lower bound, in milliseconds.
    pub min_ms: u64,

    /// Upper bound, in milliseconds.
    pub max_ms: u64,

    /// Multiplicative step applied on each adjustment (0 < f < 1).
    pub adjustment_factor: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: 5_000,
            min_ms: 1_000,
            max_ms: 30_000,
            adjustment_factor: 0.1,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub initial_interval_ms: u64,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Cap on any single delay, in milliseconds.
    pub max_interval_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 1_000,
            multiplier: 2.0,
            max_interval_ms: 10_000,
            jitter: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GuardConfig = toml::from_str("").unwrap();
        assert_eq!(config, GuardConfig::default());
        assert_eq!(config.circuit_breaker.reset_timeout(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.capacity(), 10);
    }

    #[test]
    fn test_partial_sections() {
        let raw = r#"
            [rate_limit]
            permits_per_second = 20
            max_burst_seconds = 3

            [clients.orders]
            base_url = "http://orders.internal:8080"
        "#;
        let config: GuardConfig = toml::from_str(raw).unwrap();
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.capacity(), 60);
        let orders = &config.clients["orders"];
        assert_eq!(orders.base_url, "http://orders.internal:8080");
        assert!(orders.enable_logging);
        assert_eq!(orders.connection_pool, ConnectionPoolConfig::default());
        assert!(orders.tls.is_none());
        assert_eq!(config.retries.max_attempts, 3);
    }

    #[test]
    fn test_client_transport_settings() {
        let raw = r#"
            [clients.payments]
            base_url = "https://payments.internal"

            [clients.payments.connection_pool]
            max_idle_per_host = 2
            idle_timeout_ms = 15000

            [clients.payments.tls]
            ca_cert_path = "/etc/guard/ca.pem"
            identity_path = "/etc/guard/client.p12"
            identity_password = "changeit"
        "#;
        let config: GuardConfig = toml::from_str(raw).unwrap();
        let payments = &config.clients["payments"];
        assert_eq!(payments.connection_pool.max_idle_per_host, 2);
        assert_eq!(payments.connection_pool.idle_timeout(), Duration::from_secs(15));

        let tls = payments.tls.as_ref().unwrap();
        assert_eq!(tls.ca_cert_path, Some(PathBuf::from("/etc/guard/ca.pem")));
        assert_eq!(tls.identity_path, Some(PathBuf::from("/etc/guard/client.p12")));
        assert_eq!(tls.identity_password, "changeit");

        let round_trip: GuardConfig = toml::from_str(&toml::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }
}
