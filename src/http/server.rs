//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forwarding handler
//! - Wire up middleware (tracing, timeout, call tracking)
//! - Bind server to listener
//! - Forward every call to the configured upstream

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::TrackerConfig;
use crate::http::middleware::with_tracking;
use crate::store::TrackingStore;
use crate::tracking::{TrackingCoordinator, TrackingError};

/// Errors building the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("invalid upstream address: {0:?}")]
    InvalidUpstream(String),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// Tracking reverse proxy.
pub struct HttpServer {
    router: Router,
    config: TrackerConfig,
    coordinator: Arc<TrackingCoordinator>,
}

impl HttpServer {
    /// Create a new HTTP server recording calls into `store`.
    pub fn new(config: TrackerConfig, store: Arc<dyn TrackingStore>) -> Result<Self, ServerError> {
        let coordinator = Arc::new(TrackingCoordinator::new(&config.tracking, store)?);

        let upstream = Authority::from_str(&config.upstream.address)
            .map_err(|_| ServerError::InvalidUpstream(config.upstream.address.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState { client, upstream };
        let router = Self::build_router(&config, state, coordinator.clone());

        Ok(Self {
            router,
            config,
            coordinator,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Tracking sits outside the timeout so calls that time out are still
    /// recorded with the timeout response.
    fn build_router(
        config: &TrackerConfig,
        state: AppState,
        coordinator: Arc<TrackingCoordinator>,
    ) -> Router {
        let router = Router::new()
            .route("/{*path}", any(forward))
            .route("/", any(forward))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.upstream.request_timeout_secs),
            ));

        with_tracking(router, coordinator).layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then wait for pending call
    /// records to be stored.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            header = %self.coordinator.header_name(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        // Connections are closed; records of the last calls may still be
        // on their way to the store.
        let pending = self.coordinator.pending_finalizers();
        if pending > 0 {
            tracing::info!(pending, "Waiting for call records to be stored");
        }
        let store_failures = self.coordinator.drain().await;
        if store_failures > 0 {
            tracing::warn!(store_failures, "Some call records were not stored");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn coordinator(&self) -> &Arc<TrackingCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

/// Forward the call to the upstream unchanged, streaming both bodies.
async fn forward(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "Cannot rewrite request target");
            return (StatusCode::BAD_REQUEST, "Invalid request target").into_response();
        }
    };

    tracing::debug!(method = %parts.method, uri = %parts.uri, "Forwarding request");

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(upstream = %state.upstream, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
