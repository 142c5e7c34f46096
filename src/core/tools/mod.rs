//! Tool calling.
//!
//! # Modules
//! - `manifest`: tool definitions and agent profiles
//! - `retrieval`: the knowledge base search seam and its HTTP adapter
//! - `dispatcher`: runs requested calls and returns results to the model

mod dispatcher;
mod manifest;
mod retrieval;

pub use dispatcher::{ToolCall, ToolCallStatus, ToolDispatcher, ToolError, ToolResult};
pub use manifest::{AgentProfile, KNOWLEDGE_BASE_SEARCH, ToolKind, ToolSet};
pub use retrieval::{
    HttpRetrievalEngine, NO_RESULTS_MESSAGE, RetrievalEngine, RetrievalError, RetrievalResult,
    RetrievedSnippet, format_failure, format_results, format_unknown_tool,
};
