//! Axum middleware.

pub mod tracking;

pub use tracking::{track_calls, with_tracking};
