//! Call tracking middleware.
//!
//! Hyper polls the response body after the handler has returned, so a call
//! is only complete once the response body has been fully streamed (or
//! dropped). The record is finalized and submitted from a task that waits for
//! that moment. Those tasks are tracked by the coordinator so shutdown can
//! drain them.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    Router,
};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::store::StoreError;
use crate::tracking::{CallerIdentity, RequestHead, ResponseHead, TrackedCall, TrackingCoordinator};

/// Record every call that passes through.
///
/// The caller identity comes from a [`CallerIdentity`] request extension set
/// by an authentication layer in front of this one.
pub async fn track_calls(
    State(coordinator): State<Arc<TrackingCoordinator>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let caller = request
        .extensions()
        .get::<CallerIdentity>()
        .cloned()
        .unwrap_or_default();
    let mut call = coordinator.begin(caller);

    // The head is complete at dispatch; only the body is still streaming.
    let (parts, body) = request.into_parts();
    let request_head = RequestHead::from(&parts);
    let request = Request::from_parts(parts, Body::new(call.tee_request_body(body)));

    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    call.before_headers_sent(&mut parts.headers);
    let response_head = ResponseHead::from(&parts);

    let (done_tx, done_rx) = oneshot::channel();
    let body = Body::new(call.tee_response_body(body).with_completion(done_tx));

    let span = tracing::info_span!("tracked_call", tracking_id = %call.tracking_id());
    let finalizer =
        finalize_when_complete(coordinator.clone(), call, request_head, response_head, done_rx);
    coordinator.spawn_finalizer(finalizer.instrument(span));

    Response::from_parts(parts, body)
}

async fn finalize_when_complete(
    coordinator: Arc<TrackingCoordinator>,
    call: TrackedCall,
    request: RequestHead,
    response: ResponseHead,
    done: oneshot::Receiver<()>,
) -> Result<(), StoreError> {
    // An error here means the sender was dropped, which also ends the body.
    let _ = done.await;
    let record = call.finalize(&request, &response);
    coordinator.submit(record).await
}

/// Wrap every route of `router` with call tracking.
pub fn with_tracking(router: Router, coordinator: Arc<TrackingCoordinator>) -> Router {
    router.layer(middleware::from_fn_with_state(coordinator, track_calls))
}
