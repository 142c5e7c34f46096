//! Shared application state for HTTP and WebSocket handlers.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::ServerConfig;
use crate::core::session::SessionManager;
use crate::core::tools::RetrievalEngine;
use crate::core::transport::TokenIssuer;

/// Application state shared by all routes.
pub struct AppState {
    pub config: ServerConfig,
    /// Relay sessions started by `/relay` connections and `/start-agent`
    pub sessions: Arc<SessionManager>,
    /// Signs room tokens for browser participants
    pub tokens: Arc<dyn TokenIssuer>,
    /// Knowledge base behind `/search` and the model's tool calls
    pub retrieval: Arc<dyn RetrievalEngine>,
    /// Headless agent sessions, session id to room
    pub agents: DashMap<String, String>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        sessions: Arc<SessionManager>,
        tokens: Arc<dyn TokenIssuer>,
        retrieval: Arc<dyn RetrievalEngine>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions,
            tokens,
            retrieval,
            agents: DashMap::new(),
        })
    }
}
