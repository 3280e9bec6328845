//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → sections handed to each resilience component at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; thresholds never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, ClientConfig, ConnectionPoolConfig, GuardConfig, ObservabilityConfig,
    RateLimitConfig, RetryConfig, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
