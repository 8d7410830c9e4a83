//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! coordinator, stores, server
//!     → logging.rs (structured log events, tracking_id on every call event)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
