//! HTTP handlers: health, stream endpoint, message endpoint

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use http_body_util::LengthLimitError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::ApiError;
use super::{AppState, MESSAGE_PATH, SESSION_ID_HEADER};
use crate::error::Error;
use crate::transport::{CloseReason, Session, SessionEvent, SessionGuard, SessionId};

/// `sessionId` query parameter shared by both endpoints
#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

impl SessionQuery {
    /// The parameter, treating an empty value as absent
    fn session_id(self) -> Option<String> {
        self.session_id.filter(|id| !id.is_empty())
    }
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "transport": "sse" }))
}

/// `GET /sse`
pub async fn open_stream(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    if !state.lifecycle.is_running() {
        return Err(ApiError::ShuttingDown);
    }

    let session_id = match query.session_id() {
        Some(requested) => SessionId::from(requested),
        None => state.registry.generate_id(),
    };

    let engine = state.engines.create(&session_id).map_err(|e| {
        error!(%session_id, "Error establishing SSE connection: {}", e);
        ApiError::StreamSetup(e)
    })?;
    let (session, events) = Session::new(session_id.clone(), engine);
    session
        .channel()
        .push(SessionEvent::Endpoint(endpoint_url(&session_id)))
        .map_err(ApiError::StreamSetup)?;

    let displaced = state.registry.put(Arc::clone(&session));
    // From here on the guard owns removal, whatever happens to this request
    let guard = SessionGuard::new(Arc::clone(&state.registry), Arc::clone(&session));

    if let Some(previous) = displaced {
        warn!(%session_id, "Session id claimed by a new stream, closing the previous one");
        if let Err(e) = state.registry.close(&previous, CloseReason::Replaced).await {
            warn!(%session_id, "Error closing replaced session: {}", e);
        }
    }

    // A drain may have enumerated the registry before our insert
    if !state.lifecycle.is_running() {
        if let Err(e) = state.registry.close(&session, CloseReason::Shutdown).await {
            warn!(%session_id, "Error closing session during shutdown: {}", e);
        }
        return Err(ApiError::ShuttingDown);
    }

    info!(%session_id, "SSE connection established");

    let events = stream::unfold((events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((Ok::<_, Infallible>(to_sse(event)), (events, guard)))
    });

    let mut response = Sse::new(events)
        .keep_alive(KeepAlive::new().interval(state.keep_alive))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    Ok(response)
}

/// `POST /messages?sessionId=<id>`
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: Body,
) -> Result<Response, ApiError> {
    let session_id = query.session_id().ok_or(ApiError::MissingSessionId)?;

    let session = state
        .registry
        .get(&session_id)
        .ok_or_else(|| ApiError::SessionNotFound(session_id.clone()))?;

    // Body is read only once the session is known
    let body = axum::body::to_bytes(body, state.max_message_bytes)
        .await
        .map_err(|e| match e.into_inner().downcast::<LengthLimitError>() {
            Ok(_) => ApiError::MessageTooLarge(state.max_message_bytes),
            Err(e) => ApiError::InvalidMessage(e.to_string()),
        })?;
    let message: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidMessage(e.to_string()))?;

    match session.forward(message).await {
        Ok(()) => Ok((StatusCode::ACCEPTED, "Accepted").into_response()),
        // Closed between lookup and delivery
        Err(Error::SessionClosed(_)) => Err(ApiError::SessionNotFound(session_id)),
        Err(e) => {
            error!(%session_id, "Error handling POST message for session: {}", e);
            if e.is_transport_error() {
                state.registry.release(&session, CloseReason::TransportError);
            }
            Err(ApiError::Forwarding(e))
        }
    }
}

/// Message endpoint URL announced in the `endpoint` event
fn endpoint_url(session_id: &SessionId) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(session_id.as_str().as_bytes()).collect();
    format!("{}?sessionId={}", MESSAGE_PATH, encoded)
}

fn to_sse(event: SessionEvent) -> Event {
    Event::default().event(event.name()).data(event.data())
}
