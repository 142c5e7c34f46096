//! OpenAI Realtime API module.
//!
//! Bidirectional audio streaming with server-side turn detection, user
//! transcription and function calling.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse
//!
//! # Audio Format
//!
//! Input and output audio is PCM 16-bit signed little-endian at 24kHz mono.
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_relay::core::realtime::{ModelConnector, ModelSessionConfig, OpenAIRealtimeConnector};
//! use futures::StreamExt;
//!
//! let connector = OpenAIRealtimeConnector::new("sk-...")?;
//! let session = connector.open(&ModelSessionConfig::default()).await?;
//! let mut events = session.events()?;
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtimeConnector, OpenAIRealtimeSession};
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, OPENAI_AUDIO_FORMAT,
    OPENAI_REALTIME_FORMAT, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtimeVoice,
};
pub use messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
