//! Session lifecycle and relay.
//!
//! # Modules
//! - `state`: the lifecycle state machine and session errors
//! - `manager`: session start, supervision and teardown
//! - `relay`: the audio and event loops of an active session
//! - `registry`: live sessions keyed by id

mod manager;
mod registry;
mod relay;
mod state;

pub use manager::{RelayConfig, SessionHandle, SessionManager};
pub use registry::SessionRegistry;
pub use state::{SessionError, SessionResult, SessionState};
