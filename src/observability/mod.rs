//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and histograms through the `metrics` facade)
//!
//! Consumers:
//!     → fmt layer (pretty or JSON on stdout)
//!     → whichever metrics recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - Events carry structured fields (rule id, handler, error class)
//! - Metric updates are no-ops until a recorder is installed
//! - Subject and credential values are never logged

pub mod logging;
pub mod metrics;
