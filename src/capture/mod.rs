//! Body capture subsystem.
//!
//! # Data Flow
//! ```text
//! transport bytes
//!     → tee.rs (AsyncRead / AsyncWrite / AsyncSeek pass-through)
//!     → body.rs (http_body frames for pull-model servers)
//!         → recording.rs (exact byte count + capped shadow copy)
//!     → decode.rs (content-type sniffing, charset resolution)
//!     → text or "<content-type> [<n> bytes]" placeholder
//! ```
//!
//! # Design Decisions
//! - Forwarded bytes never depend on the cap; only the shadow copy is bounded
//! - Only completed transfers are counted, so a cancelled poll leaves the count untouched
//! - The chunk that crosses the cap is recorded up to the cap boundary
//! - Decoding never fails; unknown charsets fall back to UTF-8

pub mod body;
pub mod decode;
pub mod recording;
pub mod tee;

pub use body::TeeBody;
pub use decode::{is_text_content_type, resolve_charset, Charset};
pub use recording::{Recording, RecordingBuffer};
pub use tee::BoundedTeeStream;
