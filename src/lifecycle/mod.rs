//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT → cancel the guard's root CancellationToken
//!
//! Cancellation:
//!     root token → one child token per guarded call
//!     → every retry loop waiting out a backoff returns Cancelled
//! ```
//!
//! # Design Decisions
//! - In-flight attempts are not interrupted; only waits between attempts are
//! - Cancelling a call's child token stops that call alone

pub mod signals;
