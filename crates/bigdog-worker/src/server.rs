//! HTTP host for the worker
//!
//! Serves `/__worker/health` itself and raises a fetch event for every other
//! request. Requests the worker leaves alone are forwarded to the network.

use crate::constants::HEALTH_PATH;
use crate::coordinator::{CacheCoordinator, FetchOutcome};
use crate::error::Result;
use crate::events::Dispatcher;
use crate::network::{is_hop_by_hop, CacheMode};
use crate::request::{Request, RequestMode};
use axum::{
    body::Body,
    extract::State,
    http::{request::Parts, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use cache_storage::{NamespaceStats, ResponseSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

/// Largest request body the host will buffer for forwarding
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Shared state for the HTTP server
pub struct ServerState {
    pub coordinator: Arc<CacheCoordinator>,
    pub dispatcher: Dispatcher,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    /// Wire a coordinator into a fresh dispatcher
    pub fn new(coordinator: Arc<CacheCoordinator>) -> Self {
        let mut dispatcher = Dispatcher::new();
        coordinator.register(&mut dispatcher);
        Self {
            coordinator,
            dispatcher,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache_name: String,
    pub uptime_secs: u64,
    pub namespaces: Vec<NamespaceStats>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(handle_request)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Raise install until it succeeds or attempts run out, then raise activate
pub async fn bootstrap(state: &ServerState, attempts: u32, retry_delay: Duration) -> Result<()> {
    let mut attempt = 1;
    loop {
        match state.dispatcher.install().await {
            Ok(()) => break,
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "Install failed, retrying");
                tokio::time::sleep(retry_delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(attempt, error = %e, "Install failed, giving up");
                return Err(e);
            }
        }
    }
    state.dispatcher.activate().await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let storage = state.coordinator.storage();
    let mut namespaces = Vec::new();
    match storage.keys().await {
        Ok(names) => {
            for name in names {
                let entries = match storage.entry_count(&name).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(cache = %name, error = %e, "Failed to count cache entries");
                        0
                    }
                };
                namespaces.push(NamespaceStats { name, entries });
            }
        }
        Err(e) => warn!(error = %e, "Failed to list caches for health check"),
    }

    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.coordinator.manifest().version.clone(),
        cache_name: state.coordinator.cache_name(),
        uptime_secs,
        namespaces,
    })
}

/// Dispatch a request to the worker, forwarding it when not intercepted
async fn handle_request(
    State(state): State<SharedState>,
    request: axum::extract::Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body.to_vec(),
        Err(e) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
    };

    let request = match to_worker_request(state.coordinator.origin(), &parts, body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.dispatcher.fetch(request.clone()).await {
        FetchOutcome::Respond(response) => into_response(response),
        FetchOutcome::Passthrough => {
            match state
                .coordinator
                .network()
                .fetch(&request, CacheMode::Default)
                .await
            {
                Ok(response) => into_response(response),
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Pass-through fetch failed");
                    error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable".to_string())
                }
            }
        }
    }
}

/// Build the worker's view of an incoming HTTP request
pub fn to_worker_request(origin: &Url, parts: &Parts, body: Vec<u8>) -> Result<Request> {
    // Absolute-form targets keep their own origin
    let url = if parts.uri.scheme().is_some() {
        Url::parse(&parts.uri.to_string())?
    } else {
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        origin.join(target)?
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let mode = match parts.headers.get("sec-fetch-mode").map(|v| v.as_bytes()) {
        Some(b"navigate") => RequestMode::Navigate,
        Some(b"same-origin") => RequestMode::SameOrigin,
        Some(b"no-cors") => RequestMode::NoCors,
        _ => RequestMode::Cors,
    };

    Ok(Request {
        method: parts.method.as_str().to_string(),
        url,
        headers,
        mode,
        body,
    })
}

fn into_response(snapshot: ResponseSnapshot) -> Response {
    let mut response = Response::new(Body::from(snapshot.body));
    *response.status_mut() =
        StatusCode::from_u16(snapshot.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let headers = response.headers_mut();
    for (name, value) in snapshot.headers {
        if is_hop_by_hop(&name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    response
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
