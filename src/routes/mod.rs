//! Route configuration

pub mod api;
pub mod relay;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Combine all routes and attach the application state.
pub fn create_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(relay::create_relay_router())
        .with_state(state)
}
