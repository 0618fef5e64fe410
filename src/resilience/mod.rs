//! Resilience primitives for remote calls made by stages.
//!
//! # Data Flow
//! ```text
//! Stage calls a remote service:
//!     → timeouts.rs (bound the call, elapsed → UpstreamTimeout)
//!     → on transient failure: retries.rs (backoff.rs delay, give-up budget)
//!     → error surfaced once the budget is spent
//! ```
//!
//! # Design Decisions
//! - Every remote call has a deadline
//! - Only transient upstream errors are retried; denials never are
//! - Cancellation is dropping the future; no retry outlives its caller

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{retry, RetryPolicy};
pub use timeouts::with_timeout;
