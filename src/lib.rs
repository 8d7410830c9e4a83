//! HTTP call tracking.
//!
//! Intercepts HTTP calls, forwards every byte untouched, and records a
//! bounded, content-type-aware copy of each call into a durable store.

pub mod capture;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod store;
pub mod tracking;

pub use capture::{BoundedTeeStream, RecordingBuffer, TeeBody};
pub use config::TrackerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use store::{StoreError, TrackingStore};
pub use tracking::{CallRecord, CallerIdentity, TrackingCoordinator};
