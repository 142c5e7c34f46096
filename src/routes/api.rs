use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{agent, api};
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
///
/// - `GET /` - health check with the number of live sessions
/// - `GET /health` - which services are configured
/// - `POST /token?room_name=&participant_name=` - room token for a browser
///   participant; the same fields may come as a JSON body
/// - `POST /search` - `{"query", "k"?}` knowledge base search
/// - `POST /start-agent?room_name=` - headless agent in a room
/// - `POST /stop-agent?session_id=&room_name=` - stop headless agents
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/health", get(api::detailed_health_check))
        .route("/token", post(api::generate_token))
        .route("/search", post(api::search_knowledge_base))
        .route("/start-agent", post(agent::start_agent))
        .route("/stop-agent", post(agent::stop_agent))
        .layer(TraceLayer::new_for_http())
}
