//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace + tracking layers)
//!     → middleware/tracking.rs (begin call, tee bodies, tracking-id header)
//!     → timeout layer
//!     → server.rs forward() (stream request to upstream, stream response back)
//!     → response body tee completes → record finalized and stored
//! ```

pub mod middleware;
pub mod server;

pub use middleware::{track_calls, with_tracking};
pub use server::{AppState, HttpServer, ServerError};
