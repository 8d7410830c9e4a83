//! Store that writes a summary of every call to the log.

use async_trait::async_trait;

use crate::store::{StoreError, TrackingStore};
use crate::tracking::CallRecord;

/// Emits one structured `tracing` event per call. Nothing is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStore;

impl LogStore {
    pub fn new() -> Self {
        Self
    }
}

fn join_headers(headers: &crate::tracking::HeaderEntries) -> String {
    headers
        .iter()
        .map(|(name, values)| format!("{}: {}", name, values.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
impl TrackingStore for LogStore {
    async fn insert_record(&self, record: CallRecord) -> Result<(), StoreError> {
        tracing::info!(
            target: "http_tracker::calls",
            tracking_id = %record.tracking_id(),
            caller = %record.caller_identity,
            call_start = %record.call_start(),
            duration_ms = record.call_duration.as_millis() as u64,
            verb = %record.verb,
            uri = %record.request_uri,
            request_headers = %join_headers(&record.request_headers),
            request_length = record.request_length,
            request = %record.request_body,
            status = record.status_code,
            reason = record.reason_phrase.as_deref().unwrap_or(""),
            response_headers = %join_headers(&record.response_headers),
            response_length = record.response_length,
            response = %record.response_body,
            "HTTP call"
        );
        Ok(())
    }
}
