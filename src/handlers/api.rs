//! Health, room token and knowledge base search handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::core::tools::RetrievedSnippet;
use crate::core::transport::TokenError;
use crate::state::AppState;

pub(crate) const DEFAULT_ROOM_NAME: &str = "voice-room";
const DEFAULT_PARTICIPANT_NAME: &str = "user";

const DEFAULT_SEARCH_RESULTS: usize = 5;
const MAX_SEARCH_RESULTS: usize = 50;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
}

/// Detailed health response
#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub active_agents: usize,
    pub services: ServiceStatus,
}

/// Which external services have the settings they need
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub openai: bool,
    pub livekit: bool,
    pub knowledge_base: bool,
}

/// Room token request, read from the query string or a JSON body; both
/// fields are optional
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub participant_name: Option<String>,
}

/// Room token response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// LiveKit server URL the browser connects to
    pub url: String,
    pub room: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.sessions.active_sessions(),
    })
}

/// Report the relay's load and which services are configured.
pub async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> Json<DetailedHealthResponse> {
    let config = &state.config;
    Json(DetailedHealthResponse {
        status: "healthy".to_string(),
        active_sessions: state.sessions.active_sessions(),
        active_agents: state.agents.len(),
        services: ServiceStatus {
            openai: config.openai_api_key().is_ok(),
            livekit: config.livekit_credentials().is_ok(),
            knowledge_base: !config.retrieval_url.trim().is_empty(),
        },
    })
}

/// Issue a room token for a browser participant.
///
/// Query parameters take precedence over the JSON body.
pub async fn generate_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenRequest>,
    body: Option<Json<TokenRequest>>,
) -> Response {
    let body = body.map(|Json(req)| req).unwrap_or_default();
    let room = non_blank(query.room_name)
        .or_else(|| non_blank(body.room_name))
        .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string());
    let participant = non_blank(query.participant_name)
        .or_else(|| non_blank(body.participant_name))
        .unwrap_or_else(|| DEFAULT_PARTICIPANT_NAME.to_string());

    match state.tokens.issue_token(&participant, &room) {
        Ok(credential) => {
            info!(room = %room, participant = %participant, "Issued room token");
            Json(TokenResponse {
                token: credential.as_str().to_string(),
                url: state.config.livekit_url.clone(),
                room,
            })
            .into_response()
        }
        Err(e) => {
            warn!(room = %room, "Failed to issue room token: {}", e);
            let status = match e {
                TokenError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                TokenError::MissingCredentials => StatusCode::SERVICE_UNAVAILABLE,
                TokenError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// Knowledge base search request
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_search_results")]
    pub k: usize,
}

fn default_search_results() -> usize {
    DEFAULT_SEARCH_RESULTS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RetrievedSnippet>,
    pub count: usize,
}

/// Search the knowledge base directly, outside any session.
pub async fn search_knowledge_base(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let query = request.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "query must not be empty" })),
        )
            .into_response();
    }
    if request.k == 0 || request.k > MAX_SEARCH_RESULTS {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("k must be between 1 and {MAX_SEARCH_RESULTS}") })),
        )
            .into_response();
    }

    match state.retrieval.search(query, request.k).await {
        Ok(results) => {
            info!(results = results.len(), "Knowledge base search");
            Json(SearchResponse {
                query: query.to_string(),
                count: results.len(),
                results,
            })
            .into_response()
        }
        Err(e) => {
            warn!("Knowledge base search failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Search failed: {e}") })),
            )
                .into_response()
        }
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
