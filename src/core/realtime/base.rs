//! Model connector abstraction.
//!
//! A model connector opens one bidirectional streaming session per relay
//! session with a speech-capable model service. The session accepts audio and
//! tool results, and produces a single ordered stream of [`ModelEvent`]s.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::codec::{AudioFrame, PcmFormat};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by model connectors and sessions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Network failure or rejected handshake
    #[error("Model connection failed: {0}")]
    ConnectionFailed(String),

    /// The service rejected the API key
    #[error("Model authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Session settings the service cannot accept
    #[error("Invalid model configuration: {0}")]
    InvalidConfiguration(String),

    /// A tool result referenced a call id that is not awaiting a result
    #[error("Unknown tool call id: {0}")]
    UnknownCall(String),

    /// The outgoing stream is gone
    #[error("Failed to send to model stream: {0}")]
    SendFailed(String),

    /// `events()` was already called on this session
    #[error("Model event stream already taken")]
    EventsTaken,

    /// The session has been closed
    #[error("Model session closed")]
    Closed,
}

impl ModelError {
    /// Whether the error ends the model session.
    ///
    /// Only a stale tool call id is recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ModelError::UnknownCall(_))
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

// =============================================================================
// Events
// =============================================================================

/// Speaker of a transcript fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
}

impl std::fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Severity of an error reported inside the model stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    /// The service rejected a request; the stream stays open.
    Provider,
    /// The stream itself failed; no further events follow.
    Connection,
}

/// Events produced by a model session.
///
/// Audio and transcript events are independent of each other; the session
/// does not try to correlate them.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// PCM16 audio in the session's output format
    AudioChunk(Bytes),
    TranscriptDelta {
        text: String,
        role: TranscriptRole,
    },
    ToolCallRequested {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// The service acknowledged a submitted tool result
    ToolCallCompleted {
        call_id: String,
    },
    SessionError {
        kind: ModelErrorKind,
        message: String,
    },
    /// The service ended the session
    SessionClosed,
}

/// Lazy, non-restartable sequence of model events.
pub type ModelEventStream = BoxStream<'static, ModelEvent>;

// =============================================================================
// Session Configuration
// =============================================================================

/// Function tool advertised to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Function signature of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema of the arguments object
    pub parameters: Option<serde_json::Value>,
}

/// Server-side turn detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetectionConfig {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        Self::ServerVad {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Settings used to open one model session.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSessionConfig {
    pub model: String,
    pub voice: String,
    pub instructions: Option<String>,
    /// Tool manifest advertised at open
    pub tools: Vec<ToolDefinition>,
    /// Transcription model for user audio, `None` disables user transcripts
    pub input_transcription_model: Option<String>,
    pub turn_detection: TurnDetectionConfig,
    pub temperature: Option<f32>,
}

impl Default for ModelSessionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-realtime-preview".to_string(),
            voice: "alloy".to_string(),
            instructions: None,
            tools: Vec::new(),
            input_transcription_model: Some("whisper-1".to_string()),
            turn_detection: TurnDetectionConfig::default(),
            temperature: None,
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Factory for model sessions.
#[async_trait]
pub trait ModelConnector: Send + Sync {
    /// Open a streaming session and advertise the configured tool manifest.
    async fn open(&self, config: &ModelSessionConfig) -> ModelResult<Box<dyn ModelSession>>;
}

/// One open streaming session with the model service.
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Audio format the service expects and produces.
    fn audio_format(&self) -> PcmFormat;

    /// Forward a client audio frame. Frames are sent in call order.
    ///
    /// The frame must already be in [`ModelSession::audio_format`].
    async fn send_audio(&self, frame: AudioFrame) -> ModelResult<()>;

    /// Return a tool result for a call previously seen as
    /// [`ModelEvent::ToolCallRequested`].
    ///
    /// Each call id accepts exactly one result; any other id fails with
    /// [`ModelError::UnknownCall`].
    async fn send_tool_result(&self, call_id: &str, result: &str) -> ModelResult<()>;

    /// Take the event stream. Can be called once.
    fn events(&self) -> ModelResult<ModelEventStream>;

    /// Close the session. Idempotent; queued outbound audio may be dropped.
    async fn close(&self) -> ModelResult<()>;

    fn is_open(&self) -> bool;
}
