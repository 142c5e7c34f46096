//! Transport bridge abstraction.
//!
//! A transport bridge joins one media room on behalf of a session. It turns
//! subscribed room audio into a stream of [`AudioFrame`]s and accepts frames
//! to publish back into the room.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use zeroize::Zeroize;

use crate::core::codec::{AudioFrame, PcmFormat};

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by a transport bridge.
///
/// Every variant is fatal to the session that owns the bridge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The room rejected the credential
    #[error("Room credential rejected: {0}")]
    CredentialRejected(String),

    /// Network or signalling failure while joining the room
    #[error("Room connection failed: {0}")]
    ConnectionFailed(String),

    /// Publishing the agent track or an audio frame failed
    #[error("Audio publish failed: {0}")]
    PublishFailed(String),

    /// The room session ended underneath the bridge
    #[error("Room disconnected: {0}")]
    Disconnected(String),

    /// Inbound audio can only be subscribed once per bridge
    #[error("Inbound audio already subscribed")]
    AlreadySubscribed,

    /// The bridge has been closed
    #[error("Transport closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;

// =============================================================================
// Credential
// =============================================================================

/// Opaque room-access credential.
///
/// The relay never inspects the credential; it is passed unmodified to the
/// transport. The value is cleared from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomCredential(String);

impl RoomCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RoomCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RoomCredential(***)")
    }
}

impl Drop for RoomCredential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Lazy, non-restartable sequence of inbound frames. Ends when the room
/// session ends or the bridge is closed.
pub type AudioFrameStream = BoxStream<'static, AudioFrame>;

/// Counters for the outbound publish queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundStats {
    /// Frames accepted by `publish_outbound_audio`
    pub enqueued: u64,
    /// Frames evicted by the drop-oldest policy
    pub dropped: u64,
    /// Frames handed to the room
    pub sent: u64,
    /// Frames currently waiting
    pub depth: usize,
}

/// Factory for transport bridges.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Join the room the credential grants access to.
    async fn connect(&self, credential: RoomCredential) -> TransportResult<Box<dyn TransportBridge>>;
}

/// A live connection to one media room.
#[async_trait]
pub trait TransportBridge: Send + Sync {
    /// Take the inbound audio stream.
    ///
    /// Frames carry sequence numbers in local receipt order. A second call
    /// fails with [`TransportError::AlreadySubscribed`].
    fn subscribe_inbound_audio(&self) -> TransportResult<AudioFrameStream>;

    /// Queue a frame for publication without waiting for the room.
    ///
    /// The queue is bounded; under sustained overflow the oldest unsent frame
    /// is evicted. Returns an error once publishing has failed or the bridge
    /// is closed.
    fn publish_outbound_audio(&self, frame: AudioFrame) -> TransportResult<()>;

    /// Format frames must have before they are published.
    fn publish_format(&self) -> PcmFormat;

    fn outbound_stats(&self) -> OutboundStats;

    /// Leave the room. Idempotent and safe from any state.
    async fn close(&self) -> TransportResult<()>;
}
