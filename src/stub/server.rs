//! HTTP front end for the stub engine.
//!
//! Admin endpoints live under `/_specmock/` (and the legacy `/_contract/`)
//! and are routed before anything else, so a contract can never shadow
//! them. Every other request goes through [`StubEngine::serve`].

use super::{passthrough::body_from_text, ExpectationDocument, SseExpectation, StubEngine, DEFAULT_SESSION, MAX_REPLAY_SLOTS};
use super::{Decision, RequestLogEntry};
use crate::config::StubConfig;
use crate::errors::{MatchError, ServerError};
use crate::http::{FailureKind, HttpMethod, HttpRequest, HttpResponse, SESSION_HEADER};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Current admin prefix.
pub const ADMIN_PREFIX: &str = "/_specmock";
/// Prefix accepted for older clients.
pub const LEGACY_ADMIN_PREFIX: &str = "/_contract";
/// Streaming subscription path.
pub const SSE_PATH: &str = "/features/default";

type AppState = Arc<StubEngine>;

// ---------------------------------------------------------------------------
// Server handle
// ---------------------------------------------------------------------------

/// A running stub server.
pub struct StubServer {
    addr: SocketAddr,
    engine: AppState,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
    grace: Duration,
}

impl StubServer {
    /// Bind the configured address and start serving in the background.
    pub async fn start(engine: Arc<StubEngine>, config: &StubConfig) -> Result<Self, ServerError> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::Bind {
                address: address.clone(),
                message: e.to_string(),
            })?;
        let addr = listener.local_addr().map_err(|e| ServerError::Bind {
            address,
            message: e.to_string(),
        })?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let app = router(Arc::clone(&engine));
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Stub server stopped with an error");
            }
        });

        info!(%addr, contracts = engine.features().len(), "Stub server listening");
        Ok(Self {
            addr,
            engine,
            shutdown_tx,
            handle,
            grace: config.shutdown_grace(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:54321`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn engine(&self) -> &Arc<StubEngine> {
        &self.engine
    }

    /// Stop accepting connections, end open streams and wait for in-flight
    /// requests up to the grace period. Whatever is left is aborted.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        self.engine.sse().close_all();
        let mut handle = self.handle;
        if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
            warn!(grace_secs = self.grace.as_secs(), "Grace period elapsed, aborting server task");
            handle.abort();
            let _ = handle.await;
        }
        info!(addr = %self.addr, "Stub server stopped");
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// The full application router.
pub fn router(engine: Arc<StubEngine>) -> Router {
    Router::new()
        .nest(ADMIN_PREFIX, admin_routes())
        .nest(LEGACY_ADMIN_PREFIX, admin_routes())
        .route(SSE_PATH, get(subscribe).fallback(business))
        .route(&format!("{}/*rest", SSE_PATH), get(subscribe).fallback(business))
        .fallback(business)
        .with_state(engine)
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/expectations", post(create_expectation))
        .route("/expectations/:token", delete(remove_expectations))
        .route("/sse-expectations", post(create_sse_expectation))
        .route("/state", post(stage_state))
        .route("/log", get(request_log))
        .route("/load_log", get(load_log))
        .route("/contracts", get(contracts))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

fn session_of(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

fn log_admin(engine: &StubEngine, method: &str, path: &str, status: u16) {
    engine
        .request_log()
        .record(RequestLogEntry::new(method, path, Decision::Admin, status));
}

fn bad_request(report: impl Into<String>) -> Response {
    to_axum(HttpResponse::engine_failure(400, FailureKind::Mismatch, report))
}

async fn create_expectation(State(engine): State<AppState>, body: Bytes) -> Response {
    let document: ExpectationDocument = match serde_json::from_slice(&body) {
        Ok(document) => document,
        Err(e) => {
            log_admin(&engine, "POST", "expectations", 400);
            return bad_request(format!("Malformed expectation: {}", e));
        }
    };
    let response = match engine.add_expectation(document) {
        Ok(stub) => (
            StatusCode::OK,
            Json(json!({
                "registered": stub.label(),
                "stubToken": stub.token(),
                "scenario": stub.scenario(),
            })),
        )
            .into_response(),
        Err(MatchError::Contract(e)) => {
            to_axum(HttpResponse::engine_failure(400, FailureKind::Contract, e.to_string()))
        }
        Err(e) => bad_request(e.to_string()),
    };
    log_admin(&engine, "POST", "expectations", response.status().as_u16());
    response
}

async fn remove_expectations(State(engine): State<AppState>, Path(token): Path<String>) -> Response {
    let removed = engine.registry().remove_by_token(&token);
    info!(removed, "Expectations removed by token");
    log_admin(&engine, "DELETE", "expectations", 200);
    Json(json!({ "removed": removed })).into_response()
}

async fn create_sse_expectation(State(engine): State<AppState>, body: Bytes) -> Response {
    let expectation: SseExpectation = match serde_json::from_slice(&body) {
        Ok(expectation) => expectation,
        Err(e) => return bad_request(format!("Malformed SSE expectation: {}", e)),
    };
    if expectation.buffer_index.is_some_and(|i| i >= MAX_REPLAY_SLOTS) {
        return bad_request(format!("bufferIndex must be below {}", MAX_REPLAY_SLOTS));
    }
    let delivered = engine.sse().publish(expectation);
    log_admin(&engine, "POST", "sse-expectations", 200);
    Json(json!({ "delivered": delivered })).into_response()
}

async fn stage_state(State(engine): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let facts = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(facts)) => facts,
        Ok(_) => return bad_request("Server state must be a JSON object"),
        Err(e) => return bad_request(format!("Malformed server state: {}", e)),
    };
    let session = session_of(&headers);
    engine.state().stage(&session, facts);
    log_admin(&engine, "POST", "state", 200);
    StatusCode::OK.into_response()
}

async fn request_log(State(engine): State<AppState>) -> Response {
    Json(engine.request_log().entries()).into_response()
}

async fn load_log(State(engine): State<AppState>) -> Response {
    Json(engine.load_log()).into_response()
}

async fn contracts(State(engine): State<AppState>) -> Response {
    Json(engine.features().to_vec()).into_response()
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubscribeQuery {
    #[serde(default)]
    from: usize,
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

/// SSE data lines are split on `\n` only; a bare `\r` would end a line early.
fn unix_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

async fn subscribe(
    State(engine): State<AppState>,
    Query(query): Query<SubscribeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = engine.sse().subscribe(query.from);
    info!(subscribers = engine.sse().subscriber_count(), "SSE subscriber connected");
    let events = stream::unfold(subscription, |mut subscription| async move {
        let next = subscription.recv().await?;
        let mut event = Event::default().data(unix_line_breaks(&next.data));
        if let Some(name) = next.event {
            event = event.event(single_line(&name));
        }
        if let Some(id) = next.id {
            event = event.id(single_line(&id));
        }
        Some((Ok(event), subscription))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Business requests
// ---------------------------------------------------------------------------

async fn business(
    State(engine): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(method) = HttpMethod::parse(method.as_str()) else {
        return to_axum(HttpResponse::engine_failure(
            405,
            FailureKind::Mismatch,
            format!("Unsupported method {}", method),
        ));
    };
    let session = session_of(&headers);
    let request = to_request(method, &uri, &headers, &body);
    to_axum(engine.serve(request, &session).await)
}

/// Convert an inbound request into the engine's model.
pub fn to_request(method: HttpMethod, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> HttpRequest {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let mut request = HttpRequest::from_target(method, target);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    let text = String::from_utf8_lossy(body).into_owned();
    request.body = body_from_text(request.header("content-type"), text);
    request
}

/// Convert an engine response into an axum response.
pub fn to_axum(response: HttpResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (text, implied_type) = response.body_text();

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &response.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        if !text.is_empty() && !headers.contains_key("content-type") {
            headers.insert("content-type", HeaderValue::from_static(implied_type));
        }
    }
    builder
        .body(Body::from(text))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
