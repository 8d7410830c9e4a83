//! Bounded shadow recording of a byte stream.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capture::decode;

/// Capped copy of a stream prefix plus the exact number of bytes observed.
#[derive(Debug, Clone)]
pub struct Recording {
    max_recorded_length: u64,
    observed_length: u64,
    bytes: Vec<u8>,
}

impl Recording {
    /// Create a recording that keeps at most `max_recorded_length` bytes.
    pub fn bounded(max_recorded_length: u64) -> Self {
        Self {
            max_recorded_length,
            observed_length: 0,
            bytes: Vec::new(),
        }
    }

    /// Create a recording without a cap.
    pub fn unbounded() -> Self {
        Self::bounded(u64::MAX)
    }

    /// `None` means unbounded.
    pub fn with_limit(max_recorded_length: Option<u64>) -> Self {
        max_recorded_length.map_or_else(Self::unbounded, Self::bounded)
    }

    /// Account for a completed transfer.
    ///
    /// The count always grows by `chunk.len()`. Bytes are appended until the
    /// recording holds `max_recorded_length` of them; a chunk that crosses the
    /// cap is truncated at the boundary.
    pub fn observe(&mut self, chunk: &[u8]) {
        self.observed_length = self.observed_length.saturating_add(chunk.len() as u64);

        let room = self.max_recorded_length.saturating_sub(self.bytes.len() as u64);
        if room == 0 || chunk.is_empty() {
            return;
        }
        let take = usize::try_from(room).map_or(chunk.len(), |room| room.min(chunk.len()));
        self.bytes.extend_from_slice(&chunk[..take]);
    }

    /// Total bytes that passed through the tee, independent of the cap.
    pub fn observed_length(&self) -> u64 {
        self.observed_length
    }

    pub fn max_recorded_length(&self) -> u64 {
        self.max_recorded_length
    }

    /// The recorded prefix.
    pub fn recorded(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the recorded prefix as text, or describe it when the content
    /// type is not textual.
    ///
    /// At most `min(observed_length, max_chars)` bytes are decoded.
    pub fn decode_recorded(&self, content_type: Option<&str>, max_chars: u64) -> String {
        let content_type = match content_type {
            Some(ct) if decode::is_text_content_type(Some(ct)) => ct,
            _ => return decode::placeholder(content_type, self.observed_length),
        };

        let length = self.observed_length.min(max_chars);
        let end = usize::try_from(length)
            .map_or(self.bytes.len(), |length| length.min(self.bytes.len()));
        decode::decode_text(&self.bytes[..end], content_type)
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Shared handle to a [`Recording`].
///
/// A tee and the coordinator that finalizes the call each hold one. Bodies in
/// pull-model servers are moved into the framework, so the finalizer needs a
/// handle that outlives the tee itself. Handles are never shared across calls.
#[derive(Debug, Clone, Default)]
pub struct RecordingBuffer {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingBuffer {
    pub fn new(recording: Recording) -> Self {
        Self {
            inner: Arc::new(Mutex::new(recording)),
        }
    }

    pub fn bounded(max_recorded_length: u64) -> Self {
        Self::new(Recording::bounded(max_recorded_length))
    }

    pub fn unbounded() -> Self {
        Self::new(Recording::unbounded())
    }

    pub fn with_limit(max_recorded_length: Option<u64>) -> Self {
        Self::new(Recording::with_limit(max_recorded_length))
    }

    pub fn observe(&self, chunk: &[u8]) {
        self.lock().observe(chunk);
    }

    pub fn observed_length(&self) -> u64 {
        self.lock().observed_length()
    }

    /// Copy of the recorded prefix.
    pub fn recorded(&self) -> Vec<u8> {
        self.lock().recorded().to_vec()
    }

    pub fn decode_recorded(&self, content_type: Option<&str>, max_chars: u64) -> String {
        self.lock().decode_recorded(content_type, max_chars)
    }

    // A panic while holding the lock cannot leave a Recording half-updated in a
    // way that matters for capture, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_everything_below_cap() {
        let mut recording = Recording::bounded(64);
        recording.observe(b"hello ");
        recording.observe(b"world");

        assert_eq!(recording.observed_length(), 11);
        assert_eq!(recording.recorded(), b"hello world");
        assert_eq!(
            recording.decode_recorded(Some("text/plain"), u64::MAX),
            "hello world"
        );
    }

    #[test]
    fn test_crossing_chunk_truncated_at_cap() {
        let mut recording = Recording::bounded(5);
        recording.observe(b"abc");
        recording.observe(b"defgh");
        recording.observe(b"ijk");

        assert_eq!(recording.observed_length(), 11);
        assert_eq!(recording.recorded(), b"abcde");
    }

    #[test]
    fn test_single_chunk_longer_than_cap() {
        let mut recording = Recording::bounded(5);
        recording.observe(br#"{"a":1234}"#);

        assert_eq!(recording.observed_length(), 10);
        assert_eq!(
            recording.decode_recorded(Some("application/json"), 5),
            r#"{"a":"#
        );
    }

    #[test]
    fn test_zero_cap_counts_but_records_nothing() {
        let mut recording = Recording::bounded(0);
        recording.observe(b"data");

        assert_eq!(recording.observed_length(), 4);
        assert!(recording.recorded().is_empty());
        assert_eq!(recording.decode_recorded(Some("text/plain"), u64::MAX), "");
    }

    #[test]
    fn test_max_chars_limits_decoded_prefix() {
        let mut recording = Recording::unbounded();
        recording.observe(b"0123456789");

        assert_eq!(recording.decode_recorded(Some("text/plain"), 4), "0123");
    }

    #[test]
    fn test_binary_content_ignores_buffer() {
        let mut recording = Recording::bounded(2);
        recording.observe(&[0xde, 0xad, 0xbe, 0xef]);

        assert_eq!(
            recording.decode_recorded(Some("application/octet-stream"), u64::MAX),
            "application/octet-stream [4 bytes]"
        );
        assert_eq!(recording.decode_recorded(None, u64::MAX), "N/A [4 bytes]");
    }

    #[test]
    fn test_shared_handle_sees_updates() {
        let buffer = RecordingBuffer::bounded(3);
        let tee_side = buffer.clone();
        tee_side.observe(b"abcdef");

        assert_eq!(buffer.observed_length(), 6);
        assert_eq!(buffer.recorded(), b"abc".to_vec());
    }
}
