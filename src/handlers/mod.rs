//! HTTP and WebSocket request handlers
//!
//! - `api` - Health, room token and knowledge base search endpoints
//! - `agent` - Headless agent start and stop
//! - `relay` - Client WebSocket attached to a relay session

pub mod agent;
pub mod api;
pub mod relay;

pub use relay::relay_handler;
