//! Client relay WebSocket
//!
//! A browser (or test client) attaches to one relay session over
//! `GET /relay?room=<name>`. The session joins the room as the agent and
//! connects to the model; this socket carries the session's events and
//! optional client audio.
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **audio**: `{"type":"audio","data":[i16...],"sample_rate":16000}`
//! - **stop**: `{"type":"stop"}` closes the session
//! - **Binary frames**: PCM16 little-endian mono at the room sample rate
//!
//! ## Server → Client
//!
//! Every relay event as JSON text: `audio`, `transcript`, `tool_start`,
//! `tool_end`, `error`, `state` and finally `closed`, after which the
//! server closes the socket.

mod handler;
pub mod messages;

pub use handler::relay_handler;
