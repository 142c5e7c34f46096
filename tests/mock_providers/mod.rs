//! In-process mock providers
//!
//! Stand-ins for the room transport, the model service, the knowledge base
//! and the token issuer. Each mock shares a recorder with the test so the test
//! can feed input and inspect what the relay did.

// Allow dead code in test infrastructure - not every suite uses every mock
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use voice_relay::core::codec::{AudioFrame, FrameSource, PcmFormat};
use voice_relay::core::realtime::{
    ModelConnector, ModelError, ModelEvent, ModelEventStream, ModelResult, ModelSession,
    ModelSessionConfig,
};
use voice_relay::core::session::{RelayConfig, SessionManager};
use voice_relay::core::tools::{
    RetrievalEngine, RetrievalError, RetrievalResult, RetrievedSnippet,
};
use voice_relay::core::transport::{
    AudioFrameStream, OutboundStats, RoomCredential, TokenError, TokenIssuer, TokenResult,
    TransportBridge, TransportConnector, TransportError, TransportResult,
};

pub const MODEL_FORMAT: PcmFormat = PcmFormat::mono(24000);
pub const ROOM_FORMAT: PcmFormat = PcmFormat::mono(24000);

/// Poll `condition` every 5 ms until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// 20 ms of silence in the model format
pub fn silence_frame() -> AudioFrame {
    AudioFrame::from_samples(&[0; 480], 24000, 1, 0, FrameSource::Client)
}

/// Relay settings with timeouts short enough for tests
pub fn test_relay_config() -> RelayConfig {
    RelayConfig {
        tool_grace_period: Duration::from_millis(500),
        teardown_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(2),
        event_queue_warn_depth: 0,
        ..Default::default()
    }
}

pub fn build_manager(
    transport: &MockTransport,
    model: &MockModel,
    retrieval: &MockRetrieval,
    config: RelayConfig,
) -> SessionManager {
    SessionManager::new(
        Arc::new(transport.clone()),
        Arc::new(model.clone()),
        Arc::new(retrieval.clone()),
        Arc::new(StaticTokenIssuer::default()),
        config,
    )
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Default)]
pub struct TransportRecorder {
    pub connect_attempts: AtomicUsize,
    pub connected: AtomicUsize,
    pub closed: AtomicUsize,
    /// Calls to `close`, including ones that never finish
    pub close_calls: AtomicUsize,
    pub credentials: Mutex<Vec<String>>,
    pub published: Mutex<Vec<AudioFrame>>,
    /// One inbound feed per bridge, `None` once that bridge is gone
    inbound: Mutex<Vec<Option<mpsc::UnboundedSender<AudioFrame>>>>,
    fail_publish: AtomicBool,
}

impl TransportRecorder {
    /// Deliver a frame to the most recent bridge as if it came from the room.
    pub fn push_inbound(&self, frame: AudioFrame) -> bool {
        match self.inbound.lock().iter().rev().flatten().next() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// End every inbound stream as if the room went away.
    pub fn disconnect(&self) {
        for slot in self.inbound.lock().iter_mut() {
            slot.take();
        }
    }

    pub fn fail_publishing(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    /// Bridges that were handed out and not closed yet
    pub fn open_bridges(&self) -> usize {
        self.connected.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

/// Mock room transport
#[derive(Clone, Default)]
pub struct MockTransport {
    pub recorder: Arc<TransportRecorder>,
    connect_delay: Duration,
    connect_error: Option<TransportError>,
    hang_on_close: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn failing(mut self, error: TransportError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// Bridges whose `close` never returns, like a room server that stopped
    /// answering.
    pub fn hanging_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }
}

#[async_trait]
impl TransportConnector for MockTransport {
    async fn connect(
        &self,
        credential: RoomCredential,
    ) -> TransportResult<Box<dyn TransportBridge>> {
        self.recorder.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.recorder
            .credentials
            .lock()
            .push(credential.as_str().to_string());
        tokio::time::sleep(self.connect_delay).await;

        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let slot = {
            let mut inbound = self.recorder.inbound.lock();
            inbound.push(Some(tx));
            inbound.len() - 1
        };
        self.recorder.connected.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBridge {
            recorder: self.recorder.clone(),
            slot,
            inbound: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
            hang_on_close: self.hang_on_close,
        }))
    }
}

struct MockBridge {
    recorder: Arc<TransportRecorder>,
    slot: usize,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<AudioFrame>>>,
    closed: AtomicBool,
    hang_on_close: bool,
}

#[async_trait]
impl TransportBridge for MockBridge {
    fn subscribe_inbound_audio(&self) -> TransportResult<AudioFrameStream> {
        let mut rx = self
            .inbound
            .lock()
            .take()
            .ok_or(TransportError::AlreadySubscribed)?;
        Ok(Box::pin(async_stream::stream! {
            while let Some(frame) = rx.recv().await {
                yield frame;
            }
        }))
    }

    fn publish_outbound_audio(&self, frame: AudioFrame) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.recorder.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::PublishFailed("track unpublished".into()));
        }
        self.recorder.published.lock().push(frame);
        Ok(())
    }

    fn publish_format(&self) -> PcmFormat {
        ROOM_FORMAT
    }

    fn outbound_stats(&self) -> OutboundStats {
        let sent = self.recorder.published.lock().len() as u64;
        OutboundStats {
            enqueued: sent,
            sent,
            ..Default::default()
        }
    }

    async fn close(&self) -> TransportResult<()> {
        self.recorder.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.recorder.closed.fetch_add(1, Ordering::SeqCst);
            if let Some(feed) = self.recorder.inbound.lock().get_mut(self.slot) {
                feed.take();
            }
        }
        Ok(())
    }
}

// =============================================================================
// Model
// =============================================================================

#[derive(Default)]
pub struct ModelRecorder {
    pub open_attempts: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    /// Calls to `close`, including ones that never finish
    pub close_calls: AtomicUsize,
    pub configs: Mutex<Vec<ModelSessionConfig>>,
    pub audio: Mutex<Vec<AudioFrame>>,
    pub tool_results: Mutex<Vec<(String, String)>>,
    pub tool_result_sent: Notify,
    requested: Mutex<HashSet<String>>,
    /// One event feed per session, `None` once that session is closed
    events: Mutex<Vec<Option<mpsc::UnboundedSender<ModelEvent>>>>,
    /// Answer every tool result with `ToolCallCompleted`
    auto_acknowledge: AtomicBool,
}

impl ModelRecorder {
    /// Emit an event from the most recent model session.
    pub fn emit(&self, event: ModelEvent) -> bool {
        if let ModelEvent::ToolCallRequested { call_id, .. } = &event {
            self.requested.lock().insert(call_id.clone());
        }
        match self.events.lock().iter().rev().flatten().next() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn request_tool(&self, call_id: &str, tool_name: &str, arguments: serde_json::Value) {
        self.emit(ModelEvent::ToolCallRequested {
            call_id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
        });
    }

    pub fn results_for(&self, call_id: &str) -> Vec<String> {
        self.tool_results
            .lock()
            .iter()
            .filter(|(id, _)| id == call_id)
            .map(|(_, result)| result.clone())
            .collect()
    }

    pub fn open_sessions(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

/// Mock model service
#[derive(Clone, Default)]
pub struct MockModel {
    pub recorder: Arc<ModelRecorder>,
    open_delay: Duration,
    open_error: Option<ModelError>,
    hang_on_close: bool,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn failing(mut self, error: ModelError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Sessions whose `close` never returns
    pub fn hanging_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }

    pub fn acknowledging(self) -> Self {
        self.recorder.auto_acknowledge.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ModelConnector for MockModel {
    async fn open(&self, config: &ModelSessionConfig) -> ModelResult<Box<dyn ModelSession>> {
        self.recorder.open_attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.open_delay).await;

        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let slot = {
            let mut feeds = self.recorder.events.lock();
            feeds.push(Some(tx));
            feeds.len() - 1
        };
        self.recorder.configs.lock().push(config.clone());
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockModelSession {
            recorder: self.recorder.clone(),
            slot,
            events: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
            hang_on_close: self.hang_on_close,
        }))
    }
}

struct MockModelSession {
    recorder: Arc<ModelRecorder>,
    slot: usize,
    events: Mutex<Option<mpsc::UnboundedReceiver<ModelEvent>>>,
    closed: AtomicBool,
    hang_on_close: bool,
}

#[async_trait]
impl ModelSession for MockModelSession {
    fn audio_format(&self) -> PcmFormat {
        MODEL_FORMAT
    }

    async fn send_audio(&self, frame: AudioFrame) -> ModelResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ModelError::Closed);
        }
        if frame.format() != MODEL_FORMAT {
            return Err(ModelError::InvalidConfiguration(format!(
                "expected {MODEL_FORMAT:?}, got {:?}",
                frame.format()
            )));
        }
        self.recorder.audio.lock().push(frame);
        Ok(())
    }

    async fn send_tool_result(&self, call_id: &str, result: &str) -> ModelResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ModelError::Closed);
        }
        if !self.recorder.requested.lock().remove(call_id) {
            return Err(ModelError::UnknownCall(call_id.to_string()));
        }
        self.recorder
            .tool_results
            .lock()
            .push((call_id.to_string(), result.to_string()));
        self.recorder.tool_result_sent.notify_waiters();

        if self.recorder.auto_acknowledge.load(Ordering::SeqCst) {
            self.recorder.emit(ModelEvent::ToolCallCompleted {
                call_id: call_id.to_string(),
            });
        }
        Ok(())
    }

    fn events(&self) -> ModelResult<ModelEventStream> {
        let mut rx = self.events.lock().take().ok_or(ModelError::EventsTaken)?;
        Ok(Box::pin(async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }))
    }

    async fn close(&self) -> ModelResult<()> {
        self.recorder.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.recorder.closed.fetch_add(1, Ordering::SeqCst);
            if let Some(feed) = self.recorder.events.lock().get_mut(self.slot) {
                feed.take();
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Retrieval
// =============================================================================

#[derive(Default)]
pub struct RetrievalRecorder {
    pub queries: Mutex<Vec<String>>,
    pub completed: Mutex<Vec<String>>,
}

impl RetrievalRecorder {
    pub fn call_count(&self) -> usize {
        self.queries.lock().len()
    }
}

/// Mock knowledge base with canned answers and per-query latency
#[derive(Clone, Default)]
pub struct MockRetrieval {
    pub recorder: Arc<RetrievalRecorder>,
    answers: HashMap<String, Vec<RetrievedSnippet>>,
    delays: HashMap<String, Duration>,
    failure: Option<RetrievalError>,
}

impl MockRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, query: &str, snippets: Vec<RetrievedSnippet>) -> Self {
        self.answers.insert(query.to_string(), snippets);
        self
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    /// Fail every search with `error`
    pub fn failing(mut self, error: RetrievalError) -> Self {
        self.failure = Some(error);
        self
    }
}

#[async_trait]
impl RetrievalEngine for MockRetrieval {
    async fn search(&self, query: &str, top_k: usize) -> RetrievalResult<Vec<RetrievedSnippet>> {
        self.recorder.queries.lock().push(query.to_string());
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        self.recorder.completed.lock().push(query.to_string());
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let mut snippets = self.answers.get(query).cloned().unwrap_or_default();
        snippets.truncate(top_k);
        Ok(snippets)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Issues predictable tokens, or fails every request
#[derive(Clone, Default)]
pub struct StaticTokenIssuer {
    pub fail: bool,
}

impl TokenIssuer for StaticTokenIssuer {
    fn issue_token(&self, identity: &str, room_name: &str) -> TokenResult<RoomCredential> {
        if self.fail {
            return Err(TokenError::MissingCredentials);
        }
        Ok(RoomCredential::new(format!("token:{identity}:{room_name}")))
    }
}
