//! Media room transport.
//!
//! # Modules
//! - `base`: the [`TransportConnector`] and [`TransportBridge`] traits
//! - `outbound`: drop-oldest queue guarding the publish path
//! - `room`: LiveKit room implementation
//! - `token`: room credential issuing

mod base;
mod outbound;
mod room;
mod token;

pub use base::{
    AudioFrameStream, OutboundStats, RoomCredential, TransportBridge, TransportConnector,
    TransportError, TransportResult,
};
pub use outbound::{DEFAULT_OUTBOUND_CAPACITY, OutboundAudioQueue};
pub use room::{AGENT_TRACK_NAME, LiveKitBridge, LiveKitTransport, LiveKitTransportConfig};
pub use token::{LiveKitTokenIssuer, TokenError, TokenIssuer, TokenResult};
