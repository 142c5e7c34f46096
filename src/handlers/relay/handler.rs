//! Relay WebSocket handler

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{select, sync::mpsc, time::Duration};
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, RelayQuery};
use crate::core::codec::{AudioFrame, FrameSource};
use crate::core::events::{EventReceiver, RelayEvent};
use crate::core::session::SessionHandle;
use crate::state::AppState;

/// Room joined when the client does not name one
const DEFAULT_ROOM: &str = "voice-room";

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Buffer for errors raised by the handler itself
const LOCAL_BUFFER_SIZE: usize = 64;

/// Relay WebSocket handler
///
/// Upgrades the connection and attaches it to a new relay session in the
/// requested room.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RelayQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room = query
        .room
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_ROOM.to_string());
    info!(room = %room, "Relay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, room))
}

async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>, room: String) {
    let (mut sender, mut receiver) = socket.split();

    let handle = match app_state.sessions.start(&room) {
        Ok(handle) => handle,
        Err(e) => {
            error!(room = %room, "Failed to start relay session: {}", e);
            let _ = send_event(&mut sender, &RelayEvent::error(e.code(), e.to_string())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    let session_id = handle.id().to_string();
    info!(session_id = %session_id, room = %room, "Relay WebSocket attached");

    let Some(events) = handle.take_events() else {
        error!(session_id = %session_id, "Session event queue already taken");
        handle.stop();
        return;
    };

    let (local_tx, local_rx) = mpsc::channel::<RelayEvent>(LOCAL_BUFFER_SIZE);
    let mut sender_task = tokio::spawn(forward_events(sender, events, local_rx));
    let mut sender_done = false;

    let room_rate = app_state.config.relay.room_sample_rate;
    let room_channels = app_state.config.relay.room_channels;

    loop {
        select! {
            _ = &mut sender_task => {
                sender_done = true;
                debug!(session_id = %session_id, "Event forwarding finished");
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let keep_going = handle_client_text(
                        text.as_str(),
                        &handle,
                        &local_tx,
                        room_rate,
                    )
                    .await;
                    if !keep_going {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let frame = AudioFrame::new(data, room_rate, room_channels, 0, FrameSource::Client);
                    if let Err(e) = handle.push_client_audio(frame) {
                        debug!(session_id = %session_id, "Dropping client audio: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(session_id = %session_id, "Relay WebSocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %session_id, "Relay WebSocket error: {}", e);
                    break;
                }
            }
        }
    }

    handle.stop();
    drop(local_tx);

    if !sender_done {
        let config = app_state.sessions.config();
        let limit = config.tool_grace_period + config.teardown_timeout * 2;
        if tokio::time::timeout(limit, &mut sender_task).await.is_err() {
            warn!(session_id = %session_id, "Session did not close in time, detaching socket");
            sender_task.abort();
        }
    }

    info!(session_id = %session_id, "Relay WebSocket connection terminated");
}

/// Handle one JSON message from the client. Returns false to end the socket.
async fn handle_client_text(
    text: &str,
    handle: &SessionHandle,
    local_tx: &mpsc::Sender<RelayEvent>,
    room_rate: u32,
) -> bool {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(session_id = %handle.id(), "Failed to parse client message: {}", e);
            let _ = local_tx
                .send(RelayEvent::error(
                    "parse_error",
                    format!("Invalid message format: {e}"),
                ))
                .await;
            return true;
        }
    };

    if let Err(e) = message.validate() {
        let _ = local_tx
            .send(RelayEvent::error("validation_error", e))
            .await;
        return true;
    }

    match message {
        ClientMessage::Audio { data, sample_rate } => {
            let rate = sample_rate.unwrap_or(room_rate);
            let frame = AudioFrame::from_samples(&data, rate, 1, 0, FrameSource::Client);
            if let Err(e) = handle.push_client_audio(frame) {
                debug!(session_id = %handle.id(), "Dropping client audio: {}", e);
            }
            true
        }
        ClientMessage::Stop => {
            info!(session_id = %handle.id(), "Client requested stop");
            handle.stop();
            // Keep reading until the session publishes `closed`
            true
        }
    }
}

/// Write session events and local errors to the socket until the session
/// closes or the socket fails.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut events: EventReceiver,
    mut local_rx: mpsc::Receiver<RelayEvent>,
) {
    loop {
        let event = select! {
            biased;
            Some(event) = local_rx.recv() => event,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let Err(e) = send_event(&mut sender, &event).await {
            debug!("Failed to send relay event: {}", e);
            return;
        }
        if event.is_terminal() {
            break;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &RelayEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            error!("Failed to serialize relay event: {}", e);
            Ok(())
        }
    }
}
