//! The HTTP surface of the dev server.
//!
//! Reserved `__ionify_*` endpoints (event channel, client runtime,
//! apply/error) route ahead of module serving; everything else falls
//! through to the dispatcher. Shutdown is graceful with a 3 second hard
//! timeout.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::dispatch::{self, json_response, spawn_change_loop};
use crate::error::DevError;
use crate::state::SharedState;
use crate::watcher::WatchEvent;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5273,
        }
    }
}

/// The development server.
pub struct DevServer {
    config: DevServerConfig,
    state: SharedState,
    watch_rx: Mutex<Option<mpsc::Receiver<WatchEvent>>>,
}

impl DevServer {
    pub fn new(
        config: DevServerConfig,
        state: SharedState,
        watch_rx: mpsc::Receiver<WatchEvent>,
    ) -> Self {
        Self {
            config,
            state,
            watch_rx: Mutex::new(Some(watch_rx)),
        }
    }

    /// Build the router. Public so tests can drive it without a socket.
    pub fn router(state: SharedState) -> Router {
        Router::new()
            .route("/__ionify_hmr", get(handle_subscribe))
            .route("/__ionify_hmr_client.js", get(handle_client_script))
            .route("/__ionify_hmr/apply", post(handle_apply))
            .route("/__ionify_hmr/error", post(handle_error_report))
            .route("/favicon.ico", get(handle_favicon))
            .fallback(handle_module)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state)
    }

    /// Serve until shutdown (ctrl-c), then close the watcher, the HMR
    /// coordinator, and flush the graph, force-terminating after 3 s.
    pub async fn start(self) -> Result<(), DevError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| DevError::Server(format!("failed to bind {}: {}", addr, e)))?;

        info!("ionify dev server listening on http://{}", addr);

        if let Some(rx) = self.watch_rx.lock().take() {
            spawn_change_loop(self.state.clone(), rx);
        }

        let state = self.state.clone();
        axum::serve(listener, Self::router(self.state.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DevError::Server(e.to_string()))?;

        let cleanup = tokio::task::spawn_blocking(move || {
            state.watcher.close_all();
            state.hmr.close();
            if let Err(e) = state.graph.flush() {
                warn!("graph flush on shutdown failed: {}", e);
            }
        });
        match tokio::time::timeout(Duration::from_secs(3), cleanup).await {
            Ok(_) => info!("shutdown complete"),
            Err(_) => warn!("shutdown timed out after 3s, forcing exit"),
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// `GET /__ionify_hmr`: the long-lived event channel.
async fn handle_subscribe(State(state): State<SharedState>) -> Response {
    match state.hmr.subscribe() {
        Ok((id, rx)) => {
            debug!(subscriber = id, "event channel opened");
            let stream = ReceiverStream::new(rx).map(|event| {
                Ok::<_, Infallible>(Event::default().event(event.name()).data(event.payload()))
            });
            let sse = Sse::new(stream).keep_alive(
                KeepAlive::new()
                    .interval(Duration::from_secs(15))
                    .text("ping"),
            );
            (
                [(header::CACHE_CONTROL, "no-cache, no-transform")],
                sse,
            )
                .into_response()
        }
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// `GET /__ionify_hmr_client.js`: the embedded client runtime.
async fn handle_client_script() -> Response {
    const CLIENT: &str = include_str!("../assets/hmr-client.js");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/javascript")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(CLIENT.into())
        .unwrap()
}

#[derive(Deserialize)]
struct ApplyRequest {
    id: String,
}

/// `POST /__ionify_hmr/apply`: the apply half of the handshake.
async fn handle_apply(State(state): State<SharedState>, body: axum::body::Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<ApplyRequest>(&body) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "malformed apply body"}),
        );
    };
    dispatch::apply_update(&state, &request.id).await
}

#[derive(Deserialize)]
struct ErrorReport {
    id: Option<String>,
    message: String,
}

/// `POST /__ionify_hmr/error`: client-side failure report.
async fn handle_error_report(State(state): State<SharedState>, body: axum::body::Bytes) -> Response {
    let Ok(report) = serde_json::from_slice::<ErrorReport>(&body) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({"error": "malformed error body"}),
        );
    };
    warn!(
        "[ionify] client reported error (update {:?}): {}",
        report.id, report.message
    );
    state.hmr.broadcast_error(report.id, report.message);
    json_response(StatusCode::OK, json!({"ok": true}))
}

async fn handle_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Everything else is a module request.
async fn handle_module(State(state): State<SharedState>, uri: Uri) -> Response {
    dispatch::serve_module(&state, uri.path(), uri.query()).await
}
