//! Client-facing relay events and their fan-out.

mod multiplexer;

pub use multiplexer::{EventMultiplexer, EventReceiver, RelayEvent, spawn_trace_sink};
