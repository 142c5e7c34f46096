//! The two audio/event loops of an active session.
//!
//! Each loop runs as its own task and returns a [`RelayExit`] describing
//! why it stopped. Tool calls never run inside these loops; they are handed
//! to the dispatcher, which owns their tasks.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::state::SessionError;
use crate::core::codec::{AudioFrame, FrameSource, resample};
use crate::core::events::{EventMultiplexer, RelayEvent};
use crate::core::realtime::{
    ModelError, ModelErrorKind, ModelEvent, ModelEventStream, ModelSession,
};
use crate::core::tools::ToolDispatcher;
use crate::core::transport::{AudioFrameStream, TransportBridge, TransportError};
use crate::utils::queue::MonitoredReceiver;

/// Why a relay loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayExit {
    /// An explicit stop request
    Stopped,
    /// The model service ended the session
    PeerClosed,
    Failed(SessionError),
}

fn report_format_error(events: &EventMultiplexer, session_id: &str, err: &SessionError) {
    warn!(session_id, "Dropping audio frame: {}", err);
    events.publish(RelayEvent::error(err.code(), err.to_string()));
}

/// Forward client audio to the model.
///
/// Room audio and audio pushed over the client channel are merged, converted
/// to the model's format and stamped with the session's outbound sequence
/// number. Frames are sent one at a time, so each source keeps its order.
pub(crate) async fn forward_inbound_audio(
    session_id: String,
    mut room_audio: AudioFrameStream,
    mut client_audio: MonitoredReceiver<AudioFrame>,
    model: Arc<dyn ModelSession>,
    events: Arc<EventMultiplexer>,
) -> RelayExit {
    let target = model.audio_format();
    let mut sequence: u64 = 0;
    let mut client_open = true;

    loop {
        let frame = tokio::select! {
            frame = room_audio.next() => match frame {
                Some(frame) => frame,
                None => {
                    info!(session_id = %session_id, "Room audio ended");
                    return RelayExit::Failed(
                        TransportError::Disconnected("room audio stream ended".to_string()).into(),
                    );
                }
            },
            frame = client_audio.recv(), if client_open => match frame {
                Some(frame) => frame,
                None => {
                    client_open = false;
                    continue;
                }
            },
        };

        let frame = match resample(frame, target.sample_rate, target.channels) {
            Ok(frame) => frame.with_sequence(sequence),
            Err(err) => {
                report_format_error(&events, &session_id, &err.into());
                continue;
            }
        };
        sequence += 1;

        if let Err(err) = model.send_audio(frame).await {
            if err.is_fatal() {
                return RelayExit::Failed(err.into());
            }
            warn!(session_id = %session_id, "Audio frame rejected: {}", err);
        }
    }
}

/// Route model events to the room, the dispatcher and the observers.
pub(crate) async fn relay_model_events(
    session_id: String,
    mut model_events: ModelEventStream,
    model: Arc<dyn ModelSession>,
    bridge: Arc<dyn TransportBridge>,
    dispatcher: Arc<ToolDispatcher>,
    events: Arc<EventMultiplexer>,
) -> RelayExit {
    let model_format = model.audio_format();
    let room_format = bridge.publish_format();
    let mut sequence: u64 = 0;

    while let Some(event) = model_events.next().await {
        match event {
            ModelEvent::AudioChunk(data) => {
                let frame = AudioFrame::new(
                    data,
                    model_format.sample_rate,
                    model_format.channels,
                    sequence,
                    FrameSource::Model,
                );
                let frame =
                    match resample(frame, room_format.sample_rate, room_format.channels) {
                        Ok(frame) => frame,
                        Err(err) => {
                            report_format_error(&events, &session_id, &err.into());
                            continue;
                        }
                    };
                sequence += 1;

                events.publish(RelayEvent::Audio {
                    data: frame.data().clone(),
                    sample_rate: frame.sample_rate(),
                    sequence: frame.sequence(),
                });
                if let Err(err) = bridge.publish_outbound_audio(frame) {
                    return RelayExit::Failed(err.into());
                }
            }
            ModelEvent::TranscriptDelta { text, role } => {
                events.publish(RelayEvent::Transcript { text, role });
            }
            ModelEvent::ToolCallRequested {
                call_id,
                tool_name,
                arguments,
            } => {
                if let Err(err) = dispatcher.dispatch(&call_id, &tool_name, arguments) {
                    warn!(session_id = %session_id, call_id = %call_id, "Tool call rejected: {}", err);
                    events.publish(RelayEvent::error(err.code(), err.to_string()));
                }
            }
            ModelEvent::ToolCallCompleted { call_id } => {
                dispatcher.acknowledge(&call_id);
            }
            ModelEvent::SessionError {
                kind: ModelErrorKind::Provider,
                message,
            } => {
                warn!(session_id = %session_id, "Model reported an error: {}", message);
                events.publish(RelayEvent::error("model_error", message));
            }
            ModelEvent::SessionError {
                kind: ModelErrorKind::Connection,
                message,
            } => {
                return RelayExit::Failed(ModelError::ConnectionFailed(message).into());
            }
            ModelEvent::SessionClosed => {
                info!(session_id = %session_id, "Model ended the session");
                return RelayExit::PeerClosed;
            }
        }
    }

    debug!(session_id = %session_id, "Model event stream ended");
    RelayExit::PeerClosed
}
