//! Call tracking subsystem.
//!
//! # Data Flow
//! ```text
//! incoming call
//!     → coordinator.rs begin() (CallRecord, recordings, tracking-id hook)
//!     → request body replaced by a tee (capture::tee / capture::body)
//!     → downstream handler
//!     → hooks.rs (tracking-id header, before the response head is flushed)
//!     → response body replaced by a tee
//!     → coordinator.rs finalize() (heads, lengths, decoded bodies, duration)
//!     → coordinator.rs submit() → store
//! ```
//!
//! # Design Decisions
//! - One TrackedCall per call, owned by one task; nothing shared between calls
//! - finalize() consumes the call, so a record is produced at most once
//! - Pre-flush hooks are consumed when run, so they execute at most once

pub mod coordinator;
pub mod error;
pub mod head;
pub mod hooks;
pub mod identity;
pub mod record;

pub use coordinator::{Exchange, ResponseWriter, TrackOutcome, TrackedCall, TrackingCoordinator};
pub use error::{TrackError, TrackingError};
pub use head::{RequestHead, ResponseHead};
pub use hooks::PreFlushHooks;
pub use identity::CallerIdentity;
pub use record::{CallRecord, HeaderEntries};
