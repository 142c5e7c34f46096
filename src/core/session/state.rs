//! Session lifecycle states and errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::codec::FormatError;
use crate::core::realtime::ModelError;
use crate::core::tools::ToolError;
use crate::core::transport::{TokenError, TransportError};

/// Lifecycle of one relay session.
///
/// ```text
/// connecting ──> active ──> closing ──> closed
///     │  └──────────────────>  │
///     └──> failed <────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Validate a move to `next`.
    ///
    /// Returns `Ok(true)` when the state changes and `Ok(false)` for a
    /// same-state no-op (`active`, `closing` and the terminal states).
    pub fn transition(self, next: SessionState) -> SessionResult<bool> {
        use SessionState::*;

        match (self, next) {
            (Active, Active) | (Closing, Closing) | (Closed, Closed) | (Failed, Failed) => Ok(false),
            (Connecting, Active)
            | (Connecting, Closing)
            | (Connecting, Failed)
            | (Active, Closing)
            | (Active, Failed)
            | (Closing, Closed)
            | (Closing, Failed) => Ok(true),
            (from, to) => Err(SessionError::InvalidTransition { from, to }),
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end or reject a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Credential(#[from] TokenError),

    #[error("session did not connect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("relay task failed: {0}")]
    TaskFailed(String),

    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Stable code used in client error events.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Transport(_) => "transport_error",
            SessionError::Model(ModelError::UnknownCall(_)) => "unknown_call",
            SessionError::Model(_) => "model_connection_error",
            SessionError::Format(_) => "format_error",
            SessionError::Tool(err) => err.code(),
            SessionError::Credential(_) => "credential_error",
            SessionError::ConnectTimeout(_) => "connect_timeout",
            SessionError::InvalidTransition { .. } => "invalid_transition",
            SessionError::TaskFailed(_) => "internal_error",
            SessionError::Closed => "session_closed",
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
