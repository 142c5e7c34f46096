//! Tool call dispatcher.
//!
//! Each `ToolCallRequested` becomes a [`ToolCall`] record keyed by call id
//! and a tracked task that runs the tool and returns its result to the model.
//! Calls never wait on each other: the record map is sharded per key and
//! every call owns its own task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::manifest::{ToolKind, ToolSet};
use super::retrieval::{RetrievalEngine, format_failure, format_results, format_unknown_tool};
use crate::core::events::{EventMultiplexer, RelayEvent};
use crate::core::realtime::{ModelError, ModelSession};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The model asked for a tool this session does not offer
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed
    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("duplicate tool call id '{0}'")]
    DuplicateCall(String),

    #[error("dispatcher is not accepting new calls")]
    NotAccepting,
}

impl ToolError {
    /// Stable code used in client error events.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments(_) | ToolError::Execution(_) => "tool_execution_error",
            ToolError::DuplicateCall(_) | ToolError::NotAccepting => "tool_rejected",
        }
    }

    /// Text handed back to the model in place of a real result.
    pub fn result_text(&self) -> String {
        match self {
            ToolError::UnknownTool(name) => format_unknown_tool(name),
            ToolError::InvalidArguments(msg) => format!("Error: invalid arguments: {msg}"),
            ToolError::Execution(msg) => format_failure(msg),
            other => format!("Error: {other}"),
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Pending,
    Completed,
    Failed,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub status: ToolCallStatus,
    pub result: Option<String>,
}

impl ToolCall {
    fn pending(call_id: &str, tool_name: &str, arguments: serde_json::Value) -> Self {
        Self {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
        }
    }
}

struct DispatcherInner {
    session_id: String,
    tools: ToolSet,
    retrieval: Arc<dyn RetrievalEngine>,
    model: Arc<dyn ModelSession>,
    events: Arc<EventMultiplexer>,
    calls: DashMap<String, ToolCall>,
    top_k: usize,
    cancel: CancellationToken,
}

/// Runs tool calls for one session.
pub struct ToolDispatcher {
    inner: Arc<DispatcherInner>,
    accepting: AtomicBool,
    tracker: TaskTracker,
}

impl ToolDispatcher {
    pub fn new(
        session_id: impl Into<String>,
        tools: ToolSet,
        retrieval: Arc<dyn RetrievalEngine>,
        model: Arc<dyn ModelSession>,
        events: Arc<EventMultiplexer>,
        top_k: usize,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                session_id: session_id.into(),
                tools,
                retrieval,
                model,
                events,
                calls: DashMap::new(),
                top_k: top_k.max(1),
                cancel: CancellationToken::new(),
            }),
            accepting: AtomicBool::new(true),
            tracker: TaskTracker::new(),
        }
    }

    /// Start a requested tool call. Returns once the call is registered; the
    /// tool itself runs in the background.
    ///
    /// Unknown tools and bad arguments are not errors here: they resolve the
    /// call as failed and the model is told so.
    pub fn dispatch(
        &self,
        call_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ToolResult<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(ToolError::NotAccepting);
        }

        match self.inner.calls.entry(call_id.to_string()) {
            Entry::Occupied(_) => return Err(ToolError::DuplicateCall(call_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(ToolCall::pending(call_id, tool_name, arguments.clone()));
            }
        }

        let session_id = &self.inner.session_id;
        info!(session_id = %session_id, call_id, tool = tool_name, "Tool call requested");
        self.inner.events.publish(RelayEvent::ToolStart {
            call_id: call_id.to_string(),
            name: tool_name.to_string(),
        });

        let inner = self.inner.clone();
        let call_id = call_id.to_string();
        let tool_name = tool_name.to_string();

        match self.inner.tools.resolve(&tool_name) {
            Err(err) => {
                warn!(session_id = %session_id, call_id = %call_id, "{}", err);
                self.tracker.spawn(async move {
                    inner.finish(&call_id, &tool_name, Err(err)).await;
                });
            }
            Ok(kind) => {
                self.tracker.spawn(async move {
                    let outcome = tokio::select! {
                        biased;
                        _ = inner.cancel.cancelled() => {
                            debug!(call_id = %call_id, "Tool call cancelled");
                            return;
                        }
                        outcome = inner.execute(kind, &arguments) => outcome,
                    };
                    inner.finish(&call_id, &tool_name, outcome).await;
                });
            }
        }

        Ok(())
    }

    /// Handle the model's confirmation that a result was received.
    ///
    /// The record is dropped; a confirmation for an id with no record is
    /// logged and discarded.
    pub fn acknowledge(&self, call_id: &str) -> bool {
        if self.inner.calls.remove(call_id).is_some() {
            debug!(session_id = %self.inner.session_id, call_id, "Tool result acknowledged");
            true
        } else {
            warn!(
                session_id = %self.inner.session_id,
                call_id,
                "Acknowledgement for unknown tool call"
            );
            false
        }
    }

    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting calls and wait up to `grace` for in-flight ones.
    ///
    /// Calls still running at the deadline are cancelled and marked failed.
    /// Returns how many were cancelled.
    pub async fn drain(&self, grace: Duration) -> usize {
        self.stop_accepting();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return 0;
        }

        self.inner.cancel.cancel();
        let mut cancelled = 0;
        for mut call in self.inner.calls.iter_mut() {
            if call.status == ToolCallStatus::Pending {
                call.status = ToolCallStatus::Failed;
                cancelled += 1;
            }
        }
        warn!(
            session_id = %self.inner.session_id,
            cancelled,
            "Tool calls did not finish within grace period"
        );
        self.tracker.wait().await;
        cancelled
    }

    /// Number of calls whose result has not been produced yet.
    pub fn in_flight(&self) -> usize {
        self.inner
            .calls
            .iter()
            .filter(|call| call.status == ToolCallStatus::Pending)
            .count()
    }

    pub fn get(&self, call_id: &str) -> Option<ToolCall> {
        self.inner.calls.get(call_id).map(|call| call.clone())
    }
}

impl DispatcherInner {
    async fn execute(&self, kind: ToolKind, arguments: &serde_json::Value) -> ToolResult<String> {
        match kind {
            ToolKind::KnowledgeBaseSearch => {
                let query = arguments
                    .get("query")
                    .and_then(|q| q.as_str())
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .ok_or_else(|| {
                        ToolError::InvalidArguments("missing string field 'query'".to_string())
                    })?;

                debug!(session_id = %self.session_id, query, "Searching knowledge base");
                let snippets = self
                    .retrieval
                    .search(query, self.top_k)
                    .await
                    .map_err(|e| ToolError::Execution(e.to_string()))?;
                Ok(format_results(&snippets))
            }
        }
    }

    /// Record the outcome and deliver it to the model, at most once per call.
    async fn finish(&self, call_id: &str, tool_name: &str, outcome: ToolResult<String>) {
        let (status, text) = match &outcome {
            Ok(text) => (ToolCallStatus::Completed, text.clone()),
            Err(err) => (ToolCallStatus::Failed, err.result_text()),
        };

        let first_resolution = match self.calls.get_mut(call_id) {
            Some(mut call) if call.status == ToolCallStatus::Pending => {
                call.status = status;
                call.result = Some(text.clone());
                true
            }
            _ => false,
        };
        if !first_resolution {
            debug!(call_id, "Tool call already resolved");
            return;
        }

        if let Err(err) = &outcome {
            warn!(session_id = %self.session_id, call_id, "Tool call failed: {}", err);
            self.events.publish(RelayEvent::error(err.code(), err.to_string()));
        }

        let delivered = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(call_id, "Tool result delivery cancelled");
                return;
            }
            delivered = self.model.send_tool_result(call_id, &text) => delivered,
        };

        match delivered {
            Ok(()) => info!(
                session_id = %self.session_id,
                call_id,
                success = status == ToolCallStatus::Completed,
                "Tool result sent"
            ),
            Err(ModelError::UnknownCall(id)) => {
                warn!(session_id = %self.session_id, call_id = %id, "Model rejected tool result for unknown call");
                self.events.publish(RelayEvent::error(
                    "unknown_call",
                    format!("unknown tool call id '{id}'"),
                ));
            }
            Err(err) => {
                warn!(session_id = %self.session_id, call_id, "Failed to send tool result: {}", err);
            }
        }

        self.events.publish(RelayEvent::ToolEnd {
            call_id: call_id.to_string(),
            name: tool_name.to_string(),
            success: status == ToolCallStatus::Completed,
        });
    }
}
