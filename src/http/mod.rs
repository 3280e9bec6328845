//! Outbound HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Guard::call(client, operation, || invoker.get(path))
//!     → client.rs (resolve URL, tag request ID, send)
//!     → 2xx body, or CallFailure (Transport / Status / InvalidRequest)
//! ```

pub mod client;

pub use client::{HttpInvoker, X_REQUEST_ID};
