//! Speech-capable model connectors.
//!
//! A connector opens one streaming session per relay session. The session
//! takes client audio and tool results, and yields audio, transcripts and
//! tool call requests as one ordered [`ModelEventStream`].
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime API** - full duplex audio with function calling

mod base;
pub mod openai;

pub use base::{
    FunctionDefinition, ModelConnector, ModelError, ModelErrorKind, ModelEvent, ModelEventStream,
    ModelResult, ModelSession, ModelSessionConfig, ToolDefinition, TranscriptRole,
    TurnDetectionConfig,
};
pub use openai::{OPENAI_REALTIME_FORMAT, OpenAIRealtimeConnector, OpenAIRealtimeVoice};
