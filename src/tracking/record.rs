//! The structured description of one HTTP call.

use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header name → values, in transport order.
pub type HeaderEntries = IndexMap<String, Vec<String>>;

/// A finished (or in-progress) record of one HTTP call.
///
/// `tracking_id` and `call_start` are fixed at construction. Everything else
/// is filled in by the coordinator when the call is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    tracking_id: Uuid,
    call_start: DateTime<Utc>,

    /// Caller identity, resolved once when the call starts.
    pub caller_identity: String,

    /// Wall-clock time from record creation to finalization.
    pub call_duration: Duration,

    pub verb: String,

    /// Request target as received (path and query).
    pub request_uri: String,

    pub request_headers: HeaderEntries,

    /// Bytes observed on the request body, independent of the recording cap.
    pub request_length: u64,

    /// Decoded request body, or a `"<content-type> [<n> bytes]"` placeholder.
    pub request_body: String,

    pub status_code: u16,

    pub reason_phrase: Option<String>,

    pub response_headers: HeaderEntries,

    /// Bytes observed on the response body, independent of the recording cap.
    pub response_length: u64,

    /// Decoded response body, or a `"<content-type> [<n> bytes]"` placeholder.
    pub response_body: String,
}

impl CallRecord {
    /// Start a record for a call made by `caller_identity`.
    pub fn new(caller_identity: impl Into<String>) -> Self {
        Self {
            tracking_id: Uuid::new_v4(),
            call_start: Utc::now(),
            caller_identity: caller_identity.into(),
            call_duration: Duration::ZERO,
            verb: String::new(),
            request_uri: String::new(),
            request_headers: HeaderEntries::new(),
            request_length: 0,
            request_body: String::new(),
            status_code: 0,
            reason_phrase: None,
            response_headers: HeaderEntries::new(),
            response_length: 0,
            response_body: String::new(),
        }
    }

    pub fn tracking_id(&self) -> Uuid {
        self.tracking_id
    }

    /// The tracking id as sent in the response header: lowercase, hyphenated,
    /// no braces.
    pub fn tracking_id_string(&self) -> String {
        self.tracking_id.hyphenated().to_string()
    }

    pub fn call_start(&self) -> DateTime<Utc> {
        self.call_start
    }
}

/// Copy a header map into ordered entries. Repeated names accumulate values;
/// non-UTF-8 values are converted lossily.
pub fn header_entries(headers: &HeaderMap) -> HeaderEntries {
    let mut entries = HeaderEntries::with_capacity(headers.keys_len());
    for (name, value) in headers {
        entries
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    entries
}
