//! Gateway module - HTTP surface of the SSE transport
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health                   liveness probe
//! GET  /sse[?sessionId=<id>]     open an event stream (one session)
//! POST /messages?sessionId=<id>  deliver a JSON-RPC message to a session
//! ```
//!
//! The first event on every stream is `endpoint`, carrying the URL the
//! client must POST to. Protocol output follows as `message` events.

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::SessionQuery;

use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::transport::{DrainReport, EngineFactory, Lifecycle, SessionRegistry, ShutdownTrigger};

/// Path of the message endpoint
pub const MESSAGE_PATH: &str = "/messages";

/// Response header carrying the session id of a new stream
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub engines: Arc<dyn EngineFactory>,
    pub lifecycle: Arc<Lifecycle>,
    pub keep_alive: Duration,
    /// Largest accepted `POST /messages` body
    pub max_message_bytes: usize,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        engines: Arc<dyn EngineFactory>,
        lifecycle: Arc<Lifecycle>,
        keep_alive: Duration,
        max_message_bytes: usize,
    ) -> Self {
        AppState {
            registry,
            engines,
            lifecycle,
            keep_alive,
            max_message_bytes,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([SESSION_ID_HEADER]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/sse", get(handlers::open_stream))
        .route(MESSAGE_PATH, post(handlers::post_message))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then drain every session.
///
/// Returns once the listener has stopped and in-flight connections have
/// finished.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<DrainReport>
where
    F: Future<Output = ShutdownTrigger> + Send + 'static,
{
    let lifecycle = Arc::clone(&state.lifecycle);
    let router = build_router(state);
    let (report_tx, report_rx) = oneshot::channel();

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let report = lifecycle.shutdown_on(shutdown).await;
            let _ = report_tx.send(report);
        })
        .await?;

    Ok(report_rx.await.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpEngineFactory;
    use crate::tools::ToolRegistry;
    use crate::transport::testing::{BrokenEngine, EchoEngine, FailingFactory, FixedFactory};
    use crate::transport::Session;
    use crate::transport::{LifecycleState, ProtocolEngine};
    use axum::body::{Body, BodyDataStream, Bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use futures::{Stream, StreamExt};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BODY_LIMIT: usize = 4 * 1024 * 1024;

    fn state_with(engines: Arc<dyn EngineFactory>) -> AppState {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = Arc::new(Lifecycle::new(Arc::clone(&registry), Duration::from_millis(200)));
        AppState::new(registry, engines, lifecycle, Duration::from_secs(60), BODY_LIMIT)
    }

    fn mcp_state() -> AppState {
        state_with(Arc::new(McpEngineFactory::new(Arc::new(ToolRegistry::new()))))
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Reads SSE frames off a response body.
    struct EventReader<S> {
        body: S,
        buffer: String,
    }

    impl<S> EventReader<S>
    where
        S: Stream<Item = std::result::Result<Bytes, axum::Error>> + Unpin,
    {
        fn new(body: S) -> Self {
            EventReader { body, buffer: String::new() }
        }

        /// Next `(event, data)` pair, or None when the stream ends.
        async fn next(&mut self) -> Option<(String, String)> {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let frame: String = self.buffer.drain(..end + 2).collect();
                    let mut name = String::new();
                    let mut data = String::new();
                    for line in frame.lines() {
                        if let Some(value) = line.strip_prefix("event:") {
                            name = value.trim_start().to_string();
                        } else if let Some(value) = line.strip_prefix("data:") {
                            data.push_str(value.trim_start());
                        }
                    }
                    // Keep-alive comments carry neither
                    if name.is_empty() && data.is_empty() {
                        continue;
                    }
                    return Some((name, data));
                }
                let chunk = self.body.next().await?.unwrap();
                self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        }
    }

    async fn open(router: &Router, uri: &str) -> (String, EventReader<BodyDataStream>) {
        let response = send(router, get_request(uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let header_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let mut reader = EventReader::new(response.into_body().into_data_stream());
        let (name, data) = reader.next().await.unwrap();
        assert_eq!(name, "endpoint");
        let session_id = data.strip_prefix("/messages?sessionId=").unwrap().to_string();
        assert_eq!(session_id, header_id);
        (session_id, reader)
    }

    #[tokio::test]
    async fn test_health() {
        let router = build_router(mcp_state());
        let response = send(&router, get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"status": "ok", "transport": "sse"}));
    }

    #[tokio::test]
    async fn test_missing_session_id_is_bad_request() {
        let router = build_router(mcp_state());
        for body in [r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, "not json", ""] {
            let response = send(&router, post_request("/messages", body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                json_body(response).await,
                json!({"error": "Missing sessionId query parameter"})
            );
        }

        let response = send(&router, post_request("/messages?sessionId=", "{}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let router = build_router(mcp_state());
        let response = send(
            &router,
            post_request("/messages?sessionId=never-opened", r#"{"jsonrpc":"2.0","method":"ping"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Transport not found for sessionId", "sessionId": "never-opened"})
        );
    }

    #[tokio::test]
    async fn test_ping_roundtrip_then_disconnect() {
        let state = mcp_state();
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);

        let (session_id, mut reader) = open(&router, "/sse").await;
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&session_id));

        let uri = format!("/messages?sessionId={}", session_id);
        let response = send(&router, post_request(&uri, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let (name, data) = reader.next().await.unwrap();
        assert_eq!(name, "message");
        let message: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(message, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));

        // Client goes away
        drop(reader);
        assert!(registry.is_empty());

        let response = send(&router, post_request(&uri, r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Transport not found for sessionId", "sessionId": session_id})
        );
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_bad_request() {
        let state = mcp_state();
        let router = build_router(state);
        let (session_id, _reader) = open(&router, "/sse").await;

        let uri = format!("/messages?sessionId={}", session_id);
        let response = send(&router, post_request(&uri, "{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Invalid message");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_explicit_session_id_is_adopted() {
        let state = mcp_state();
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);

        let (session_id, _reader) = open(&router, "/sse?sessionId=my-session").await;
        assert_eq!(session_id, "my-session");
        assert!(registry.get("my-session").is_some());
    }

    #[tokio::test]
    async fn test_colliding_session_id_closes_previous_stream() {
        let state = mcp_state();
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);

        let (_, mut first) = open(&router, "/sse?sessionId=shared").await;
        let original = registry.get("shared").unwrap();

        let (_, mut second) = open(&router, "/sse?sessionId=shared").await;
        assert_eq!(registry.len(), 1);
        let current = registry.get("shared").unwrap();
        assert!(!Arc::ptr_eq(&original, &current));

        // Old stream has ended; dropping it must not evict the new session
        assert!(first.next().await.is_none());
        drop(first);
        assert!(Arc::ptr_eq(&registry.get("shared").unwrap(), &current));

        let response = send(
            &router,
            post_request("/messages?sessionId=shared", r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let (_, data) = second.next().await.unwrap();
        assert!(data.contains(r#""id":9"#));
    }

    #[tokio::test]
    async fn test_engine_setup_failure_is_server_error() {
        let state = state_with(Arc::new(FailingFactory));
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);

        let response = send(&router, get_request("/sse")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Failed to establish SSE connection");
        assert!(body["message"].as_str().unwrap().contains("no engine available"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_forwarding_failure_is_server_error() {
        let state = state_with(Arc::new(FixedFactory(|| {
            Arc::new(BrokenEngine) as Arc<dyn ProtocolEngine>
        })));
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);
        let (session_id, _reader) = open(&router, "/sse").await;

        let uri = format!("/messages?sessionId={}", session_id);
        let response = send(&router, post_request(&uri, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Failed to handle message");
        assert_eq!(body["message"], "Engine error: engine exploded");

        // Engine errors are not transport errors; the session stays open
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_streams_refused_after_drain() {
        let state = mcp_state();
        let lifecycle = Arc::clone(&state.lifecycle);
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);

        let (_, mut reader) = open(&router, "/sse").await;
        let report = lifecycle.drain().await;
        assert_eq!(report.closed, 1);
        assert!(registry.is_empty());
        assert!(reader.next().await.is_none());

        let response = send(&router, get_request("/sse")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    fn oversized_body() -> String {
        let padding = "x".repeat(256);
        format!(r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#, padding)
    }

    fn small_limit_state() -> AppState {
        let mut state = mcp_state();
        state.max_message_bytes = 64;
        state
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let router = build_router(small_limit_state());
        let (session_id, _reader) = open(&router, "/sse").await;

        let uri = format!("/messages?sessionId={}", session_id);
        let response = send(&router, post_request(&uri, oversized_body())).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"], "Message too large");
    }

    #[tokio::test]
    async fn test_session_checks_precede_body_limit() {
        let router = build_router(small_limit_state());

        let response = send(&router, post_request("/messages", oversized_body())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Missing sessionId query parameter"})
        );

        let response = send(&router, post_request("/messages?sessionId=nope", oversized_body())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["sessionId"], "nope");
    }

    #[tokio::test]
    async fn test_transport_failure_releases_session() {
        let state = mcp_state();
        let registry = Arc::clone(&state.registry);
        let router = build_router(state);

        // Stream already gone, so the echo cannot be written
        let (session, events) = Session::new("dead-stream".into(), Arc::new(EchoEngine));
        drop(events);
        registry.put(Arc::clone(&session));

        let response = send(
            &router,
            post_request("/messages?sessionId=dead-stream", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Failed to handle message");
        assert!(registry.is_empty());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_serve_drains_live_sessions_over_http() {
        let state = mcp_state();
        let registry = Arc::clone(&state.registry);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async move {
            let _ = stop_rx.await;
            ShutdownTrigger::Terminate
        }));

        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);

        let health: Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let mut streams = Vec::new();
        for _ in 0..3 {
            let response = client.get(format!("{}/sse", base)).send().await.unwrap();
            assert_eq!(response.status(), 200);
            let mut reader = EventReader::new(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(axum::Error::new))
                    .boxed(),
            );
            let (name, data) = reader.next().await.unwrap();
            assert_eq!(name, "endpoint");
            streams.push((data, reader));
        }
        assert_eq!(registry.len(), 3);

        let (endpoint, reader) = &mut streams[0];
        let response = client
            .post(format!("{}{}", base, endpoint))
            .json(&json!({"jsonrpc": "2.0", "id": "abc", "method": "ping"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        let (_, data) = reader.next().await.unwrap();
        assert!(data.contains(r#""id":"abc""#));

        stop_tx.send(()).unwrap();
        for (_, reader) in streams.iter_mut() {
            assert!(reader.next().await.is_none());
        }
        drop(streams);

        let report = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.closed, 3);
        assert!(registry.is_empty());
    }
}
