//! Sequences capture around one downstream call.
//!
//! # Protocol
//! ```text
//! Start     begin()                  record + recordings + tracking-id hook
//! Wrap      tee_request/tee_response body streams replaced by tees
//! Hook      before_headers_sent()    runs once, before the response head leaves
//! Dispatch  (caller awaits the downstream handler)
//! Finalize  finalize()               heads, lengths, decoded bodies, duration
//! Submit    submit()                 exactly one store call
//! ```
//!
//! [`TrackingCoordinator::track`] drives the whole protocol for push-model
//! hosts (handler writes into an `AsyncWrite`). Pull-model hosts use the
//! individual steps; see `http::middleware`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::capture::{BoundedTeeStream, RecordingBuffer, TeeBody};
use crate::config::TrackingConfig;
use crate::observability::metrics;
use crate::store::{StoreError, TrackingStore};
use crate::tracking::head::{content_type, RequestHead, ResponseHead};
use crate::tracking::hooks::PreFlushHooks;
use crate::tracking::record::{header_entries, CallRecord};
use crate::tracking::{CallerIdentity, TrackError, TrackingError};

/// Creates tracked calls and submits their records to a store.
///
/// One coordinator is shared by all calls; it holds no per-call state.
/// Finalizers spawned for pull-model calls are tracked so shutdown can wait
/// for every pending record to reach the store.
#[derive(Clone)]
pub struct TrackingCoordinator {
    header_name: HeaderName,
    max_request_length: Option<u64>,
    max_response_length: Option<u64>,
    store: Arc<dyn TrackingStore>,
    finalizers: TaskTracker,
    store_failures: Arc<AtomicU64>,
}

impl std::fmt::Debug for TrackingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingCoordinator")
            .field("header_name", &self.header_name)
            .field("max_request_length", &self.max_request_length)
            .field("max_response_length", &self.max_response_length)
            .field("pending_finalizers", &self.finalizers.len())
            .finish_non_exhaustive()
    }
}

impl TrackingCoordinator {
    pub fn new(config: &TrackingConfig, store: Arc<dyn TrackingStore>) -> Result<Self, TrackingError> {
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes())
            .map_err(|_| TrackingError::InvalidHeaderName(config.header_name.clone()))?;

        Ok(Self {
            header_name,
            max_request_length: config.max_recorded_request_length,
            max_response_length: config.max_recorded_response_length,
            store,
            finalizers: TaskTracker::new(),
            store_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// Start tracking a call made by `caller`.
    pub fn begin(&self, caller: CallerIdentity) -> TrackedCall {
        let record = CallRecord::new(caller.into_inner());

        let mut hooks = PreFlushHooks::new();
        let name = self.header_name.clone();
        let tracking_id = record.tracking_id_string();
        hooks.register(move |headers: &mut HeaderMap| {
            if let Ok(value) = HeaderValue::from_str(&tracking_id) {
                headers.insert(name, value);
            }
        });

        tracing::debug!(
            tracking_id = %record.tracking_id(),
            caller = %record.caller_identity,
            "Tracking call"
        );

        TrackedCall {
            record,
            started: Instant::now(),
            request: RecordingBuffer::with_limit(self.max_request_length),
            response: RecordingBuffer::with_limit(self.max_response_length),
            max_request_chars: self.max_request_length.unwrap_or(u64::MAX),
            max_response_chars: self.max_response_length.unwrap_or(u64::MAX),
            hooks: Some(hooks),
        }
    }

    /// Hand a finished record to the store. Failures are logged, counted and
    /// returned; there is no retry.
    pub async fn submit(&self, record: CallRecord) -> Result<(), StoreError> {
        let tracking_id = record.tracking_id();
        metrics::record_call(record.status_code, record.call_duration);
        metrics::record_captured_bytes("request", record.request_length);
        metrics::record_captured_bytes("response", record.response_length);

        tracing::info!(
            tracking_id = %tracking_id,
            verb = %record.verb,
            uri = %record.request_uri,
            status = record.status_code,
            duration_ms = record.call_duration.as_millis() as u64,
            "Call completed"
        );

        match self.store.insert_record(record).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(tracking_id = %tracking_id, error = %e, "Failed to store call record");
                metrics::record_store_failure();
                self.store_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Number of records the store has rejected so far.
    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Spawn a task that finalizes and submits a call once it completes.
    /// Its outcome is already logged and counted by [`submit`](Self::submit).
    pub fn spawn_finalizer<F>(&self, finalizer: F)
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        self.finalizers.spawn(finalizer);
    }

    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.len()
    }

    /// Wait for every spawned finalizer to finish. Returns the total number
    /// of store failures seen by this coordinator.
    pub async fn drain(&self) -> u64 {
        self.finalizers.close();
        self.finalizers.wait().await;
        self.store_failures()
    }

    /// Run one push-model call end to end.
    ///
    /// The handler receives the request head, the tee'd request stream and a
    /// [`ResponseWriter`] around the response sink, and hands the writer back
    /// when it is done. If the handler fails, nothing is recorded.
    pub async fn track<R, W, H, Fut, E>(
        &self,
        caller: CallerIdentity,
        request: RequestHead,
        body: R,
        sink: W,
        handler: H,
    ) -> Result<TrackOutcome, TrackError<E>>
    where
        H: FnOnce(Exchange<R, W>) -> Fut,
        Fut: Future<Output = Result<ResponseWriter<W>, E>>,
        E: std::fmt::Display,
    {
        let mut call = self.begin(caller);
        let tracking_id = call.tracking_id();

        let exchange = Exchange {
            request: request.clone(),
            body: call.tee_request(body),
            response: ResponseWriter::new(call.tee_response(sink), call.take_hooks()),
        };

        let writer = handler(exchange).await.map_err(|e| {
            tracing::warn!(tracking_id = %tracking_id, error = %e, "Downstream handler failed, call not recorded");
            TrackError::Handler(e)
        })?;

        let response = writer.into_head();
        let record = call.finalize(&request, &response);
        self.submit(record).await?;

        Ok(TrackOutcome {
            tracking_id,
            response,
        })
    }
}

/// Capture state of one in-flight call. Owned by exactly one task.
#[derive(Debug)]
pub struct TrackedCall {
    record: CallRecord,
    started: Instant,
    request: RecordingBuffer,
    response: RecordingBuffer,
    max_request_chars: u64,
    max_response_chars: u64,
    hooks: Option<PreFlushHooks>,
}

impl TrackedCall {
    pub fn tracking_id(&self) -> Uuid {
        self.record.tracking_id()
    }

    pub fn record(&self) -> &CallRecord {
        &self.record
    }

    pub fn tee_request<S>(&self, inner: S) -> BoundedTeeStream<S> {
        BoundedTeeStream::new(inner, self.request.clone())
    }

    pub fn tee_response<S>(&self, inner: S) -> BoundedTeeStream<S> {
        BoundedTeeStream::new(inner, self.response.clone())
    }

    pub fn tee_request_body<B>(&self, body: B) -> TeeBody<B> {
        TeeBody::new(body, self.request.clone())
    }

    pub fn tee_response_body<B>(&self, body: B) -> TeeBody<B> {
        TeeBody::new(body, self.response.clone())
    }

    /// Hooks still waiting to run; `None` once the headers have been sent.
    pub fn hooks_mut(&mut self) -> Option<&mut PreFlushHooks> {
        self.hooks.as_mut()
    }

    pub fn headers_sent(&self) -> bool {
        self.hooks.is_none()
    }

    /// Run the pre-flush hooks against the outgoing response headers. Only
    /// the first call has any effect.
    pub fn before_headers_sent(&mut self, headers: &mut HeaderMap) {
        if let Some(hooks) = self.hooks.take() {
            hooks.run(headers);
        }
    }

    fn take_hooks(&mut self) -> PreFlushHooks {
        self.hooks.take().unwrap_or_default()
    }

    /// Complete the record from the request and response heads and the two
    /// recordings.
    pub fn finalize(self, request: &RequestHead, response: &ResponseHead) -> CallRecord {
        let mut record = self.record;

        record.verb = request.method.to_string();
        // Origin-form, even when the request line carried an absolute URI
        record.request_uri = request
            .uri
            .path_and_query()
            .map_or("/", |target| target.as_str())
            .to_string();
        record.request_headers = header_entries(&request.headers);
        record.request_length = self.request.observed_length();
        record.request_body = self
            .request
            .decode_recorded(content_type(&request.headers).as_deref(), self.max_request_chars);

        record.status_code = response.status.as_u16();
        record.reason_phrase = response.status.canonical_reason().map(str::to_string);
        record.response_headers = header_entries(&response.headers);
        record.response_length = self.response.observed_length();
        record.response_body = self
            .response
            .decode_recorded(content_type(&response.headers).as_deref(), self.max_response_chars);

        record.call_duration = self.started.elapsed();
        record
    }
}

/// What a push-model handler gets to work with.
#[derive(Debug)]
pub struct Exchange<R, W> {
    pub request: RequestHead,
    pub body: BoundedTeeStream<R>,
    pub response: ResponseWriter<W>,
}

/// Response side of a push-model call.
///
/// The head must go out before any body byte. [`ResponseWriter::body`] sends
/// a default `200 OK` head if the handler has not sent one yet, so the
/// pre-flush hooks always run first.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    head: Option<ResponseHead>,
    hooks: Option<PreFlushHooks>,
    body: BoundedTeeStream<W>,
}

impl<W> ResponseWriter<W> {
    fn new(body: BoundedTeeStream<W>, hooks: PreFlushHooks) -> Self {
        Self {
            head: None,
            hooks: Some(hooks),
            body,
        }
    }

    /// Send the response head, running the pre-flush hooks on it. Returns the
    /// head as it goes out. Once a head is sent, later ones are ignored.
    pub fn send_head(&mut self, mut head: ResponseHead) -> &ResponseHead {
        let hooks = &mut self.hooks;
        self.head.get_or_insert_with(|| {
            if let Some(hooks) = hooks.take() {
                hooks.run(&mut head.headers);
            }
            head
        })
    }

    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// The tee'd response sink.
    pub fn body(&mut self) -> &mut BoundedTeeStream<W> {
        if self.head.is_none() {
            self.send_head(ResponseHead::default());
        }
        &mut self.body
    }

    fn into_head(mut self) -> ResponseHead {
        if self.head.is_none() {
            self.send_head(ResponseHead::default());
        }
        self.head.unwrap_or_default()
    }
}

/// Result of a push-model call that was recorded.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub tracking_id: Uuid,
    pub response: ResponseHead,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::http::header::CONTENT_TYPE;
    use axum::http::{Method, StatusCode};
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn coordinator(
        max_request: Option<u64>,
        max_response: Option<u64>,
    ) -> (TrackingCoordinator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = TrackingConfig {
            header_name: "http-tracking-id".to_string(),
            max_recorded_request_length: max_request,
            max_recorded_response_length: max_response,
        };
        let coordinator = TrackingCoordinator::new(&config, store.clone()).unwrap();
        (coordinator, store)
    }

    fn json_request(uri: &str) -> RequestHead {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        RequestHead::new(Method::POST, uri.parse().unwrap(), headers)
    }

    #[test]
    fn test_rejects_invalid_header_name() {
        let config = TrackingConfig {
            header_name: "bad header".to_string(),
            ..TrackingConfig::default()
        };
        let result = TrackingCoordinator::new(&config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(TrackingError::InvalidHeaderName(_))));
    }

    #[test]
    fn test_hook_injects_tracking_id_once() {
        let (coordinator, _) = coordinator(None, None);
        let mut call = coordinator.begin(CallerIdentity::anonymous());
        let expected = call.record().tracking_id_string();

        let mut headers = HeaderMap::new();
        call.before_headers_sent(&mut headers);
        assert!(call.headers_sent());
        assert!(call.hooks_mut().is_none());
        assert_eq!(headers["http-tracking-id"], expected.as_str());

        headers.remove("http-tracking-id");
        call.before_headers_sent(&mut headers);
        assert!(headers.get("http-tracking-id").is_none());
    }

    #[test]
    fn test_extra_hooks_run_after_tracking_hook() {
        let (coordinator, _) = coordinator(None, None);
        let mut call = coordinator.begin(CallerIdentity::anonymous());
        call.hooks_mut().unwrap().register(|headers| {
            let seen = headers.contains_key("http-tracking-id");
            headers.insert("x-saw-tracking-id", HeaderValue::from_static(if seen { "yes" } else { "no" }));
        });

        let mut headers = HeaderMap::new();
        call.before_headers_sent(&mut headers);
        assert_eq!(headers["x-saw-tracking-id"], "yes");
    }

    #[tokio::test]
    async fn test_track_records_capped_request() {
        let (coordinator, store) = coordinator(Some(5), None);
        let request = json_request("/orders?limit=1");
        let body: &[u8] = br#"{"a":1234}"#;

        let outcome = coordinator
            .track(
                CallerIdentity::new("alice"),
                request,
                body,
                Vec::new(),
                |mut exchange: Exchange<&[u8], Vec<u8>>| async move {
                    let mut received = Vec::new();
                    exchange.body.read_to_end(&mut received).await?;
                    assert_eq!(received, br#"{"a":1234}"#);

                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
                    exchange.response.send_head(ResponseHead::new(StatusCode::CREATED, headers));
                    exchange.response.body().write_all(b"created").await?;
                    Ok::<_, io::Error>(exchange.response)
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.response.status, StatusCode::CREATED);
        assert_eq!(
            outcome.response.headers["http-tracking-id"],
            outcome.tracking_id.hyphenated().to_string().as_str()
        );

        assert_eq!(store.len(), 1);
        let record = store.get(&outcome.tracking_id).unwrap();
        assert_eq!(record.caller_identity, "alice");
        assert_eq!(record.verb, "POST");
        assert_eq!(record.request_uri, "/orders?limit=1");
        assert_eq!(record.request_length, 10);
        assert_eq!(record.request_body, r#"{"a":"#);
        assert_eq!(record.status_code, 201);
        assert_eq!(record.reason_phrase.as_deref(), Some("Created"));
        assert_eq!(record.response_length, 7);
        assert_eq!(record.response_body, "created");
        assert_eq!(
            record.response_headers["http-tracking-id"],
            [outcome.tracking_id.hyphenated().to_string()]
        );
    }

    #[tokio::test]
    async fn test_track_defaults_head_on_first_write() {
        let (coordinator, store) = coordinator(None, None);

        let outcome = coordinator
            .track(
                CallerIdentity::anonymous(),
                RequestHead::new(Method::GET, "/".parse().unwrap(), HeaderMap::new()),
                tokio::io::empty(),
                Vec::new(),
                |mut exchange: Exchange<tokio::io::Empty, Vec<u8>>| async move {
                    exchange.response.body().write_all(&[0u8; 32]).await?;
                    // Too late: the default head already went out
                    exchange.response.send_head(ResponseHead::new(StatusCode::IM_A_TEAPOT, HeaderMap::new()));
                    Ok::<_, io::Error>(exchange.response)
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.response.status, StatusCode::OK);
        let record = store.get(&outcome.tracking_id).unwrap();
        assert_eq!(record.caller_identity, "anonymous");
        assert_eq!(record.request_body, "N/A [0 bytes]");
        assert_eq!(record.response_body, "N/A [32 bytes]");
        assert!(record.response_headers.contains_key("http-tracking-id"));
    }

    #[tokio::test]
    async fn test_handler_failure_records_nothing() {
        let (coordinator, store) = coordinator(None, None);

        let result = coordinator
            .track(
                CallerIdentity::anonymous(),
                json_request("/fail"),
                tokio::io::empty(),
                Vec::new(),
                |_exchange: Exchange<tokio::io::Empty, Vec<u8>>| async move {
                    Err::<ResponseWriter<Vec<u8>>, _>(io::Error::new(io::ErrorKind::Other, "boom"))
                },
            )
            .await;

        assert!(matches!(result, Err(TrackError::Handler(_))));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_finalize_measures_duration_and_lengths() {
        let (coordinator, _) = coordinator(Some(4), Some(4));
        let call = coordinator.begin(CallerIdentity::anonymous());
        let start = call.record().call_start();

        let mut request_body = call.tee_request(&b"abcdefgh"[..]);
        let mut sink = Vec::new();
        tokio::io::copy(&mut request_body, &mut sink).await.unwrap();

        let mut response_body = call.tee_response(Vec::new());
        response_body.write_all(&[0xff; 9]).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut request = json_request("/x");
        request.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let record = call.finalize(&request, &ResponseHead::default());

        assert_eq!(record.call_start(), start);
        assert!(record.call_duration >= std::time::Duration::from_millis(5));
        assert_eq!(record.request_length, 8);
        assert_eq!(record.request_body, "abcd");
        assert_eq!(record.response_length, 9);
        assert_eq!(record.response_body, "N/A [9 bytes]");
    }

    /// Store that rejects everything and counts how often it was asked.
    #[derive(Default)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TrackingStore for FailingStore {
        async fn insert_record(&self, _record: CallRecord) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates_without_retry() {
        let store = Arc::new(FailingStore::default());
        let coordinator = TrackingCoordinator::new(&TrackingConfig::default(), store.clone()).unwrap();

        let result = coordinator
            .track(
                CallerIdentity::anonymous(),
                json_request("/lost"),
                tokio::io::empty(),
                Vec::new(),
                |exchange: Exchange<tokio::io::Empty, Vec<u8>>| async move {
                    Ok::<_, io::Error>(exchange.response)
                },
            )
            .await;

        assert!(matches!(result, Err(TrackError::Store(StoreError::Io(_)))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.store_failures(), 1);
    }

    #[tokio::test]
    async fn test_drain_waits_for_finalizers() {
        let (coordinator, store) = coordinator(None, None);
        let call = coordinator.begin(CallerIdentity::anonymous());
        let tracking_id = call.tracking_id();

        let submitter = coordinator.clone();
        coordinator.spawn_finalizer(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let record = call.finalize(&json_request("/late"), &ResponseHead::default());
            submitter.submit(record).await
        });
        assert_eq!(coordinator.pending_finalizers(), 1);

        assert_eq!(coordinator.drain().await, 0);
        assert_eq!(coordinator.pending_finalizers(), 0);
        assert!(store.get(&tracking_id).is_some());
    }

    #[test]
    fn test_request_uri_is_origin_form() {
        let (coordinator, _) = coordinator(None, None);
        let call = coordinator.begin(CallerIdentity::anonymous());

        let request = json_request("http://api.example.com:8080/orders?id=7");
        let record = call.finalize(&request, &ResponseHead::default());
        assert_eq!(record.request_uri, "/orders?id=7");

        let call = coordinator.begin(CallerIdentity::anonymous());
        let request = json_request("http://api.example.com");
        let record = call.finalize(&request, &ResponseHead::default());
        assert_eq!(record.request_uri, "/");
    }

    #[test]
    fn test_non_ascii_content_type_kept_in_placeholder() {
        let (coordinator, _) = coordinator(None, None);
        let call = coordinator.begin(CallerIdentity::anonymous());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_bytes(b"image/caf\xe9").unwrap());
        let record = call.finalize(
            &json_request("/"),
            &ResponseHead::new(StatusCode::OK, headers),
        );
        assert_eq!(record.response_body, "image/caf\u{fffd} [0 bytes]");
    }
}
