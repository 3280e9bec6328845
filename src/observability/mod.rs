//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience components produce:
//!     → logging.rs (structured log events: transitions, rejections, retries)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Breaker transitions and rate-limit rejections log at warn with the client as a field
//! - JSON lines are opt-in through `observability.json_logs`
//! - Metrics are cheap (atomic increments behind the facade)

pub mod logging;
pub mod metrics;
