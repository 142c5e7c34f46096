//! OpenAI Realtime API client implementation.
//!
//! [`OpenAIRealtimeConnector`] opens one WebSocket per relay session and
//! returns an [`OpenAIRealtimeSession`]. A single connection task owns both
//! halves of the socket: it writes queued client events in order and turns
//! server events into [`ModelEvent`]s on an unbounded, monitored queue.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use super::config::{OPENAI_REALTIME_FORMAT, OPENAI_REALTIME_URL};
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
use crate::core::codec::{AudioFrame, PcmFormat};
use crate::core::realtime::base::{
    ModelConnector, ModelError, ModelErrorKind, ModelEvent, ModelEventStream, ModelResult,
    ModelSession, ModelSessionConfig, TranscriptRole,
};
use crate::utils::queue::{MonitoredReceiver, MonitoredSender, monitored_channel};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// How long `close` waits for the connection task to send its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default high-water mark for the model event queue.
const DEFAULT_EVENT_QUEUE_WARN_DEPTH: usize = 1024;

// =============================================================================
// Connector
// =============================================================================

/// Opens OpenAI Realtime sessions.
#[derive(Clone)]
pub struct OpenAIRealtimeConnector {
    api_key: String,
    endpoint: String,
    event_queue_warn_depth: usize,
}

impl std::fmt::Debug for OpenAIRealtimeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIRealtimeConnector")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAIRealtimeConnector {
    pub fn new(api_key: impl Into<String>) -> ModelResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ModelError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            endpoint: OPENAI_REALTIME_URL.to_string(),
            event_queue_warn_depth: DEFAULT_EVENT_QUEUE_WARN_DEPTH,
        })
    }

    /// Override the WebSocket endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_event_queue_warn_depth(mut self, depth: usize) -> Self {
        self.event_queue_warn_depth = depth;
        self
    }

    /// Build the WebSocket handshake request for `model`.
    fn build_request(&self, model: &str) -> ModelResult<http::Request<()>> {
        let url = Url::parse_with_params(&self.endpoint, &[("model", model)])
            .map_err(|e| ModelError::InvalidConfiguration(format!("endpoint: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ModelError::InvalidConfiguration(
                    "endpoint has no host".to_string(),
                ));
            }
        };

        http::Request::builder()
            .uri(url.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .header("Sec-WebSocket-Protocol", "realtime")
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| ModelError::ConnectionFailed(e.to_string()))
    }
}

fn classify_handshake_error(err: tungstenite::Error) -> ModelError {
    match &err {
        tungstenite::Error::Http(response)
            if response.status() == http::StatusCode::UNAUTHORIZED
                || response.status() == http::StatusCode::FORBIDDEN =>
        {
            ModelError::AuthenticationFailed(format!("HTTP {}", response.status()))
        }
        _ => ModelError::ConnectionFailed(err.to_string()),
    }
}

#[async_trait]
impl ModelConnector for OpenAIRealtimeConnector {
    async fn open(&self, config: &ModelSessionConfig) -> ModelResult<Box<dyn ModelSession>> {
        let request = self.build_request(&config.model)?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(classify_handshake_error)?;

        info!(model = %config.model, tools = config.tools.len(), "Connected to OpenAI Realtime API");

        let (ws_sink, ws_stream) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = monitored_channel("model-events", self.event_queue_warn_depth);
        let requested_calls = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = CancellationToken::new();

        // The session configuration, including the tool manifest, is the
        // first event on the wire.
        outgoing_tx
            .send(ClientEvent::SessionUpdate {
                session: SessionConfig::from(config),
            })
            .await
            .map_err(|e| ModelError::SendFailed(e.to_string()))?;

        let io_task = tokio::spawn(run_connection(
            ws_sink,
            ws_stream,
            outgoing_rx,
            event_tx,
            requested_calls.clone(),
            shutdown.clone(),
        ));

        Ok(Box::new(OpenAIRealtimeSession {
            outgoing: Mutex::new(Some(outgoing_tx)),
            events: Mutex::new(Some(event_rx)),
            requested_calls,
            shutdown,
            io_task: Mutex::new(Some(io_task)),
            closed: AtomicBool::new(false),
        }))
    }
}

// =============================================================================
// Connection Task
// =============================================================================

async fn run_connection<S, R>(
    mut sink: S,
    mut stream: R,
    mut outgoing: mpsc::Receiver<ClientEvent>,
    events: MonitoredSender<ModelEvent>,
    requested_calls: Arc<Mutex<HashSet<String>>>,
    shutdown: CancellationToken,
) where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    // FunctionCallArgumentsDone may omit the function name; it is taken from
    // the preceding OutputItemAdded for the same call id.
    let mut pending_names: HashMap<String, String> = HashMap::new();

    // Server events take priority over queued client events.
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if let Some(model_event) =
                                    translate_server_event(event, &mut pending_names, &requested_calls)
                                    && events.send(model_event).is_err()
                                {
                                    debug!("Model event receiver dropped");
                                }
                            }
                            Err(e) => {
                                warn!("Failed to parse server event: {} - {}", e, text);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("OpenAI Realtime WebSocket closed by server: {:?}", frame);
                        let _ = events.send(ModelEvent::SessionClosed);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("OpenAI Realtime WebSocket error: {}", e);
                        let _ = events.send(ModelEvent::SessionError {
                            kind: ModelErrorKind::Connection,
                            message: e.to_string(),
                        });
                        break;
                    }
                    None => {
                        info!("OpenAI Realtime stream ended");
                        let _ = events.send(ModelEvent::SessionClosed);
                        break;
                    }
                }
            }

            outgoing_event = outgoing.recv() => {
                let Some(event) = outgoing_event else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize client event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    error!("Failed to send WebSocket message: {}", e);
                    let _ = events.send(ModelEvent::SessionError {
                        kind: ModelErrorKind::Connection,
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }
    }

    requested_calls.lock().clear();
    debug!("OpenAI Realtime connection task ended");
}

/// Map one server event onto the relay's event model.
///
/// Returns `None` for events that only need logging or bookkeeping.
fn translate_server_event(
    event: ServerEvent,
    pending_names: &mut HashMap<String, String>,
    requested_calls: &Mutex<HashSet<String>>,
) -> Option<ModelEvent> {
    match event {
        ServerEvent::SessionCreated { session } => {
            info!(
                session_id = %session.id,
                model = ?session.model,
                "OpenAI Realtime session created"
            );
            None
        }
        ServerEvent::SessionUpdated { session } => {
            debug!("OpenAI Realtime session updated: {}", session.id);
            None
        }
        ServerEvent::Error { error } => {
            warn!(
                "OpenAI Realtime error: {} - {}",
                error.error_type, error.message
            );
            Some(ModelEvent::SessionError {
                kind: ModelErrorKind::Provider,
                message: format!("{}: {}", error.error_type, error.message),
            })
        }
        ServerEvent::SpeechStarted { audio_start_ms } => {
            info!("User speech started at {}ms", audio_start_ms);
            None
        }
        ServerEvent::SpeechStopped { audio_end_ms } => {
            info!("User speech stopped at {}ms", audio_end_ms);
            None
        }
        ServerEvent::TranscriptionCompleted { transcript } => Some(ModelEvent::TranscriptDelta {
            text: transcript,
            role: TranscriptRole::User,
        }),
        ServerEvent::AudioTranscriptDelta { delta } | ServerEvent::TextDelta { delta } => {
            Some(ModelEvent::TranscriptDelta {
                text: delta,
                role: TranscriptRole::Assistant,
            })
        }
        ServerEvent::AudioDelta { delta } => match ServerEvent::decode_audio_delta(&delta) {
            Ok(audio) => Some(ModelEvent::AudioChunk(Bytes::from(audio))),
            Err(e) => {
                error!("Failed to decode audio delta: {}", e);
                None
            }
        },
        ServerEvent::OutputItemAdded { item } => {
            if item.item_type == "function_call"
                && let (Some(call_id), Some(name)) = (item.call_id, item.name)
            {
                debug!("Tracking function call: call_id={}, name={}", call_id, name);
                pending_names.insert(call_id, name);
            }
            None
        }
        ServerEvent::FunctionCallArgumentsDone {
            call_id,
            arguments,
            name,
        } => {
            let tracked = pending_names.remove(&call_id);
            let tool_name = name.or(tracked).unwrap_or_else(|| {
                warn!(
                    "Function name not found for call_id: {}. This may indicate a protocol issue.",
                    call_id
                );
                String::new()
            });
            let arguments = serde_json::from_str(&arguments)
                .unwrap_or_else(|_| serde_json::Value::String(arguments.clone()));

            requested_calls.lock().insert(call_id.clone());
            Some(ModelEvent::ToolCallRequested {
                call_id,
                tool_name,
                arguments,
            })
        }
        ServerEvent::ConversationItemCreated { item } => {
            if item.item_type == "function_call_output" {
                item.call_id
                    .map(|call_id| ModelEvent::ToolCallCompleted { call_id })
            } else {
                None
            }
        }
        ServerEvent::ResponseDone { response } => {
            debug!("Response done: {} ({:?})", response.id, response.status);
            None
        }
        ServerEvent::Unknown => {
            trace!("Unhandled server event");
            None
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// One open OpenAI Realtime session.
pub struct OpenAIRealtimeSession {
    outgoing: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    events: Mutex<Option<MonitoredReceiver<ModelEvent>>>,
    /// Call ids announced to the relay and still awaiting a result
    requested_calls: Arc<Mutex<HashSet<String>>>,
    shutdown: CancellationToken,
    io_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl OpenAIRealtimeSession {
    async fn send_event(&self, event: ClientEvent) -> ModelResult<()> {
        let sender = self.outgoing.lock().clone().ok_or(ModelError::Closed)?;
        sender
            .send(event)
            .await
            .map_err(|e| ModelError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl ModelSession for OpenAIRealtimeSession {
    fn audio_format(&self) -> PcmFormat {
        OPENAI_REALTIME_FORMAT
    }

    async fn send_audio(&self, frame: AudioFrame) -> ModelResult<()> {
        if frame.format() != OPENAI_REALTIME_FORMAT {
            return Err(ModelError::InvalidConfiguration(format!(
                "audio must be {}, got {}",
                OPENAI_REALTIME_FORMAT,
                frame.format()
            )));
        }
        self.send_event(ClientEvent::audio_append(frame.data())).await
    }

    async fn send_tool_result(&self, call_id: &str, result: &str) -> ModelResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ModelError::Closed);
        }
        if !self.requested_calls.lock().remove(call_id) {
            return Err(ModelError::UnknownCall(call_id.to_string()));
        }

        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, result),
        })
        .await?;

        // Ask the model to speak now that the tool output is in the conversation.
        self.send_event(ClientEvent::ResponseCreate).await
    }

    fn events(&self) -> ModelResult<ModelEventStream> {
        let mut rx = self.events.lock().take().ok_or(ModelError::EventsTaken)?;
        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }

    async fn close(&self) -> ModelResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.cancel();
        self.outgoing.lock().take();

        let handle = self.io_task.lock().take();
        if let Some(mut handle) = handle
            && tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err()
        {
            warn!("OpenAI Realtime connection task did not stop in time, aborting");
            handle.abort();
        }

        self.requested_calls.lock().clear();
        info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
            && self
                .outgoing
                .lock()
                .as_ref()
                .is_some_and(|sender| !sender.is_closed())
    }
}
