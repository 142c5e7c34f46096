//! Headless agent control.
//!
//! `POST /start-agent` runs a relay session in a room with no client socket
//! attached. Browsers join the same room with a `/token` credential and talk
//! to the agent through LiveKit alone. `POST /stop-agent` ends such sessions.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::api::{DEFAULT_ROOM_NAME, non_blank};
use crate::core::events::{EventReceiver, RelayEvent};
use crate::core::session::SessionError;
use crate::state::AppState;

/// Query parameters of `/start-agent`
#[derive(Debug, Default, Deserialize)]
pub struct StartAgentQuery {
    #[serde(default)]
    pub room_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartAgentResponse {
    pub status: String,
    pub room: String,
    pub session_id: String,
    pub message: String,
}

/// Query parameters of `/stop-agent`
///
/// With neither field set every headless agent is stopped.
#[derive(Debug, Default, Deserialize)]
pub struct StopAgentQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub room_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopAgentResponse {
    pub status: String,
    /// Session ids that were stopped
    pub stopped: Vec<String>,
    pub message: String,
}

/// Start a headless voice agent in `room_name` (default `voice-room`).
///
/// Returns as soon as the session is registered; connection progress is
/// logged by the agent's event watcher.
pub async fn start_agent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StartAgentQuery>,
) -> Response {
    let room = non_blank(query.room_name).unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string());

    let handle = match state.sessions.start(&room) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(room = %room, "Failed to start voice agent: {}", e);
            return start_error_response(&e);
        }
    };
    let session_id = handle.id().to_string();

    match handle.take_events() {
        Some(events) => {
            state.agents.insert(session_id.clone(), room.clone());
            tokio::spawn(watch_agent(state.clone(), session_id.clone(), events));
        }
        None => warn!(session_id = %session_id, "Agent event queue already taken"),
    }
    info!(session_id = %session_id, room = %room, "Voice agent starting");

    Json(StartAgentResponse {
        status: "starting".to_string(),
        room,
        session_id,
        message: "Voice agent is connecting to the room".to_string(),
    })
    .into_response()
}

/// Stop headless agents matching the query and wait for them to close.
pub async fn stop_agent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StopAgentQuery>,
) -> Response {
    let session_filter = non_blank(query.session_id);
    let room_filter = non_blank(query.room_name);

    if let Some(id) = &session_filter
        && !state.agents.contains_key(id)
    {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No voice agent with session id '{id}'") })),
        )
            .into_response();
    }

    let targets: Vec<String> = state
        .agents
        .iter()
        .filter(|entry| session_filter.as_ref().is_none_or(|id| entry.key() == id))
        .filter(|entry| room_filter.as_ref().is_none_or(|room| entry.value() == room))
        .map(|entry| entry.key().clone())
        .collect();

    let handles: Vec<_> = targets
        .iter()
        .filter_map(|id| state.sessions.get(id))
        .collect();
    for handle in &handles {
        handle.stop();
    }

    let config = state.sessions.config();
    let limit = config.tool_grace_period + config.teardown_timeout * 2;
    for handle in &handles {
        if tokio::time::timeout(limit, handle.wait_closed())
            .await
            .is_err()
        {
            warn!(session_id = %handle.id(), "Voice agent did not stop in time");
        }
    }
    for id in &targets {
        state.agents.remove(id);
    }

    info!(stopped = targets.len(), "Voice agents stopped");
    let message = if targets.is_empty() {
        "No voice agent was running"
    } else {
        "Voice agent has been stopped"
    };
    Json(StopAgentResponse {
        status: "stopped".to_string(),
        stopped: targets,
        message: message.to_string(),
    })
    .into_response()
}

/// Drain a headless session's events into the log until it closes.
async fn watch_agent(state: Arc<AppState>, session_id: String, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match &event {
            RelayEvent::Audio { .. } => {}
            RelayEvent::Error { code, message } => {
                warn!(session_id = %session_id, code = %code, "Voice agent error: {}", message);
            }
            RelayEvent::Closed { reason } => {
                info!(session_id = %session_id, reason = %reason, "Voice agent closed");
            }
            _ => debug!(session_id = %session_id, kind = event.kind(), "Voice agent event"),
        }
    }
    state.agents.remove(&session_id);
}

fn start_error_response(error: &SessionError) -> Response {
    let status = match error {
        SessionError::Credential(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({
            "error": format!("Failed to start agent: {error}"),
            "code": error.code(),
        })),
    )
        .into_response()
}
