//! Transparent tee over a tokio byte stream.
//!
//! # Responsibilities
//! - Forward every read, write, flush and seek to the wrapped transport
//! - Count every byte that completes a transfer
//! - Mirror a capped prefix into a [`RecordingBuffer`]
//!
//! # Design Decisions
//! - Bytes are counted only on `Poll::Ready(Ok(_))`; a pending or failed
//!   transfer leaves the count unchanged
//! - Writes record exactly the bytes the transport accepted, not the whole
//!   buffer offered to it

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use crate::capture::RecordingBuffer;

/// Stream wrapper that forwards all data to `inner` while recording a
/// bounded copy.
#[derive(Debug)]
pub struct BoundedTeeStream<S> {
    inner: S,
    recording: RecordingBuffer,
}

impl<S> BoundedTeeStream<S> {
    /// Wrap `inner`, mirroring transferred bytes into `recording`. The cap is
    /// carried by the recording.
    pub fn new(inner: S, recording: RecordingBuffer) -> Self {
        Self { inner, recording }
    }

    /// Wrap `inner` with an unbounded recording.
    pub fn unbounded(inner: S) -> Self {
        Self::new(inner, RecordingBuffer::unbounded())
    }

    /// Exact number of bytes transferred so far.
    pub fn observed_length(&self) -> u64 {
        self.recording.observed_length()
    }

    pub fn decode_recorded(&self, content_type: Option<&str>, max_chars: u64) -> String {
        self.recording.decode_recorded(content_type, max_chars)
    }

    pub fn recording(&self) -> &RecordingBuffer {
        &self.recording
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for BoundedTeeStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.recording.observe(&buf.filled()[before..]);
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for BoundedTeeStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.recording.observe(&buf[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl<S: AsyncSeek + Unpin> AsyncSeek for BoundedTeeStream<S> {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().inner).poll_complete(cx)
    }
}
