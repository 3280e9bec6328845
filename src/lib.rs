//! Resilience layer for outbound REST calls.
//!
//! Wraps calls to named backends with per-client rate limiting, per-client circuit
//! breaking, bounded exponential-backoff retries and adaptive per-operation timeouts.

// Core subsystems
pub mod guard;
pub mod http;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::{load_config, ConfigError, GuardConfig};
pub use guard::{ClientStatus, Guard};
pub use http::HttpInvoker;
pub use resilience::{CallFailure, GuardError};
pub use tokio_util::sync::CancellationToken;
