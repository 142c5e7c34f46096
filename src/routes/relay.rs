//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /relay?room=<name>` - WebSocket upgrade that starts a relay session
/// in the named room (default `voice-room`)
///
/// # Client audio
///
/// - JSON `{"type": "audio", "data": [i16...], "sample_rate": 16000}` carries
///   mono PCM16 samples. `sample_rate` is optional, must lie within 8000 to
///   48000 Hz and defaults to the room sample rate.
/// - Binary frames carry raw little-endian PCM16 with no header. They are
///   taken to be in the configured room format (`relay.room_sample_rate` and
///   `relay.room_channels`). The format is not checked, so a client sending
///   any other rate or layout is heard at the wrong speed.
///
/// # Example
///
/// ```json
/// // Server pushes session events
/// {"type": "state", "state": "connecting"}
/// {"type": "state", "state": "active"}
/// {"type": "tool_start", "call_id": "c1", "name": "knowledge_base_search"}
///
/// // Client ends the session
/// {"type": "stop"}
///
/// // Last event before the socket closes
/// {"type": "closed", "reason": "stopped"}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/relay", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
