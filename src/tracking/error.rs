//! Tracking errors.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while setting up tracking.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("invalid tracking header name: {0:?}")]
    InvalidHeaderName(String),
}

/// Failure of a tracked call.
///
/// Decoding problems never show up here; they fall back silently.
#[derive(Debug, Error)]
pub enum TrackError<E> {
    /// The downstream handler failed. No record was submitted.
    #[error("downstream handler failed: {0}")]
    Handler(#[source] E),

    /// The call completed but the store rejected its record. Not retried.
    #[error("failed to store call record: {0}")]
    Store(#[from] StoreError),
}
