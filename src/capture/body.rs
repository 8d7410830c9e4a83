//! Tee over an HTTP body for pull-model servers (hyper / axum).
//!
//! In a pull-model server the response body is polled by the connection task
//! after the handler has returned. A [`TeeBody`] can carry a completion signal
//! so the caller learns when the last byte has been observed.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use hyper::body::{Body, Bytes, Frame, SizeHint};
use tokio::sync::oneshot;

use crate::capture::RecordingBuffer;

/// HTTP body wrapper that forwards every frame unchanged while recording
/// DATA frames into a [`RecordingBuffer`]. Trailers are forwarded, not
/// recorded.
#[derive(Debug)]
pub struct TeeBody<B> {
    inner: B,
    recording: RecordingBuffer,
    completion: Option<oneshot::Sender<()>>,
}

impl<B> TeeBody<B> {
    pub fn new(inner: B, recording: RecordingBuffer) -> Self {
        Self {
            inner,
            recording,
            completion: None,
        }
    }

    /// Signal `done` once, when the body ends, fails, or is dropped,
    /// whichever happens first.
    pub fn with_completion(mut self, done: oneshot::Sender<()>) -> Self {
        self.completion = Some(done);
        self
    }

    pub fn observed_length(&self) -> u64 {
        self.recording.observed_length()
    }

    pub fn recording(&self) -> &RecordingBuffer {
        &self.recording
    }

    fn complete(&mut self) {
        if let Some(done) = self.completion.take() {
            // The receiver may already be gone; nothing left to notify.
            let _ = done.send(());
        }
    }
}

impl<B> Body for TeeBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.recording.observe(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                this.complete();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for TeeBody<B> {
    fn drop(&mut self) {
        self.complete();
    }
}
