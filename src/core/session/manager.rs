//! Session manager.
//!
//! [`SessionManager::start`] registers a session in `connecting` and hands
//! the rest of its life to a supervisor task. The supervisor owns every
//! resource of the session: both connector handles, the tool dispatcher, the
//! relay tasks and the event multiplexer. It drives the state machine from
//! connector results, relay task exits and the stop signal.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::registry::SessionRegistry;
use super::relay::{RelayExit, forward_inbound_audio, relay_model_events};
use super::state::{SessionError, SessionResult, SessionState};
use crate::core::codec::AudioFrame;
use crate::core::events::{EventMultiplexer, EventReceiver, RelayEvent, spawn_trace_sink};
use crate::core::realtime::{ModelConnector, ModelSession, ModelSessionConfig};
use crate::core::tools::{AgentProfile, RetrievalEngine, ToolDispatcher};
use crate::core::transport::{RoomCredential, TokenIssuer, TransportBridge, TransportConnector};
use crate::utils::queue::{MonitoredReceiver, MonitoredSender, monitored_channel};

/// Per-session relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub profile: AgentProfile,
    /// Model settings; tools and default instructions come from `profile`
    pub model: ModelSessionConfig,
    /// Identity the relay joins rooms with
    pub agent_identity: String,
    pub retrieval_top_k: usize,
    pub tool_grace_period: Duration,
    pub teardown_timeout: Duration,
    pub connect_timeout: Duration,
    pub event_queue_warn_depth: usize,
    pub trace_events: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            profile: AgentProfile::default(),
            model: ModelSessionConfig::default(),
            agent_identity: "voice-agent".to_string(),
            retrieval_top_k: 3,
            tool_grace_period: Duration::from_millis(5000),
            teardown_timeout: Duration::from_millis(3000),
            connect_timeout: Duration::from_millis(10000),
            event_queue_warn_depth: 1024,
            trace_events: false,
        }
    }
}

impl RelayConfig {
    /// Model settings with the profile's tool manifest applied.
    pub fn model_session_config(&self) -> ModelSessionConfig {
        let mut config = self.model.clone();
        config.tools = self.profile.tools().definitions();
        if config.instructions.is_none() {
            config.instructions = Some(self.profile.instructions().to_string());
        }
        config
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Shared view of one running session.
pub struct SessionHandle {
    id: String,
    room: String,
    state: watch::Receiver<SessionState>,
    stop: CancellationToken,
    client_audio: MonitoredSender<AudioFrame>,
    events: Mutex<Option<EventReceiver>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Queue audio received over the client channel for the model.
    pub fn push_client_audio(&self, frame: AudioFrame) -> SessionResult<()> {
        if self.state().is_terminal() {
            return Err(SessionError::Closed);
        }
        self.client_audio
            .send(frame)
            .map_err(|_| SessionError::Closed)
    }

    /// Ask the session to close. Safe to call more than once.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Take the client event queue. Only the first caller gets it.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.events.lock().take()
    }

    /// Wait until the session is `closed` or `failed`.
    pub async fn wait_closed(&self) -> SessionState {
        let mut state = self.state.clone();
        let result = state.wait_for(|s| s.is_terminal()).await.map(|terminal| *terminal);
        match result {
            Ok(terminal) => terminal,
            Err(_) => *state.borrow(),
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Starts sessions and keeps the registry of live ones.
pub struct SessionManager {
    transport: Arc<dyn TransportConnector>,
    model: Arc<dyn ModelConnector>,
    retrieval: Arc<dyn RetrievalEngine>,
    credentials: Arc<dyn TokenIssuer>,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn TransportConnector>,
        model: Arc<dyn ModelConnector>,
        retrieval: Arc<dyn RetrievalEngine>,
        credentials: Arc<dyn TokenIssuer>,
        config: RelayConfig,
    ) -> Self {
        Self {
            transport,
            model,
            retrieval,
            credentials,
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Start a session in `room` and return immediately.
    ///
    /// The session is registered as `connecting`; progress is reported
    /// through its state and event queue.
    pub fn start(&self, room: &str) -> SessionResult<Arc<SessionHandle>> {
        let credential = self
            .credentials
            .issue_token(&self.config.agent_identity, room)?;

        let id = Uuid::new_v4().to_string();
        let events = Arc::new(EventMultiplexer::new(
            id.clone(),
            self.config.event_queue_warn_depth,
        ));
        let client_events = events.subscribe("client");
        if self.config.trace_events {
            spawn_trace_sink(&events);
        }

        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (audio_tx, audio_rx) = monitored_channel(
            format!("client-audio:{id}"),
            self.config.event_queue_warn_depth,
        );
        let stop = CancellationToken::new();

        let handle = Arc::new(SessionHandle {
            id: id.clone(),
            room: room.to_string(),
            state: state_rx,
            stop: stop.clone(),
            client_audio: audio_tx,
            events: Mutex::new(Some(client_events)),
        });
        self.registry.insert(handle.clone());
        events.publish(RelayEvent::State {
            state: SessionState::Connecting,
        });
        info!(session_id = %id, room, "Session connecting");

        let supervisor = SessionSupervisor {
            id,
            state: SessionState::Connecting,
            state_tx,
            credential: Some(credential),
            transport: self.transport.clone(),
            model: self.model.clone(),
            retrieval: self.retrieval.clone(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            events,
            client_audio: Some(audio_rx),
            stop,
        };
        tokio::spawn(supervisor.run());

        Ok(handle)
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.registry.get(id)
    }

    /// Stop every live session and wait for them to finish.
    pub async fn shutdown(&self) {
        let handles = self.registry.handles();
        if handles.is_empty() {
            return;
        }
        info!(sessions = handles.len(), "Stopping all sessions");

        for handle in &handles {
            handle.stop();
        }
        let limit = self.config.tool_grace_period + self.config.teardown_timeout * 2;
        for handle in handles {
            if tokio::time::timeout(limit, handle.wait_closed())
                .await
                .is_err()
            {
                warn!(session_id = %handle.id(), "Session did not close in time");
            }
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

enum ConnectAbort {
    Stopped,
    Failed(SessionError),
}

type Legs = (Box<dyn TransportBridge>, Box<dyn ModelSession>);

struct SessionSupervisor {
    id: String,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    credential: Option<RoomCredential>,
    transport: Arc<dyn TransportConnector>,
    model: Arc<dyn ModelConnector>,
    retrieval: Arc<dyn RetrievalEngine>,
    config: Arc<RelayConfig>,
    registry: Arc<SessionRegistry>,
    events: Arc<EventMultiplexer>,
    client_audio: Option<MonitoredReceiver<AudioFrame>>,
    stop: CancellationToken,
}

impl SessionSupervisor {
    async fn run(mut self) {
        let (bridge, model) = match self.connect().await {
            Ok(legs) => legs,
            Err(ConnectAbort::Stopped) => {
                self.set_state(SessionState::Closing);
                self.finish(None, "stopped");
                return;
            }
            Err(ConnectAbort::Failed(err)) => {
                self.finish(Some(err), "connect_failed");
                return;
            }
        };
        let bridge: Arc<dyn TransportBridge> = Arc::from(bridge);
        let model: Arc<dyn ModelSession> = Arc::from(model);

        self.set_state(SessionState::Active);
        info!(session_id = %self.id, "Session active");

        let dispatcher = Arc::new(ToolDispatcher::new(
            self.id.clone(),
            self.config.profile.tools(),
            self.retrieval.clone(),
            model.clone(),
            self.events.clone(),
            self.config.retrieval_top_k,
        ));

        let mut tasks = JoinSet::new();
        let exit = match self.spawn_relay(&mut tasks, &bridge, &model, &dispatcher) {
            Ok(()) => self.wait_for_exit(&mut tasks).await,
            Err(err) => RelayExit::Failed(err),
        };

        // Teardown. Relay tasks keep running while tool calls drain so late
        // results and acknowledgements still flow.
        self.set_state(SessionState::Closing);
        let cancelled = dispatcher.drain(self.config.tool_grace_period).await;
        if cancelled > 0 {
            warn!(session_id = %self.id, cancelled, "Force-closed pending tool calls");
        }
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        self.release(Some(bridge), Some(model)).await;

        match exit {
            RelayExit::Stopped => self.finish(None, "stopped"),
            RelayExit::PeerClosed => self.finish(None, "peer_closed"),
            RelayExit::Failed(err) => {
                let reason = err.code();
                self.finish(Some(err), reason)
            }
        }
    }

    /// Establish both legs concurrently.
    ///
    /// On any failure the leg that did connect is closed; a leg still in
    /// progress is dropped before it produces a handle.
    async fn connect(&mut self) -> Result<Legs, ConnectAbort> {
        let credential = self
            .credential
            .take()
            .ok_or(ConnectAbort::Failed(SessionError::Closed))?;
        let transport = self.transport.clone();
        let connector = self.model.clone();
        let model_config = self.config.model_session_config();
        let connect_timeout = self.config.connect_timeout;

        let transport_leg = async move { transport.connect(credential).await };
        let model_leg = async move { connector.open(&model_config).await };
        let deadline = tokio::time::sleep(connect_timeout);
        tokio::pin!(transport_leg, model_leg, deadline);

        let mut bridge: Option<Box<dyn TransportBridge>> = None;
        let mut session: Option<Box<dyn ModelSession>> = None;

        let abort = loop {
            if bridge.is_some() && session.is_some() {
                break None;
            }
            tokio::select! {
                result = &mut transport_leg, if bridge.is_none() => match result {
                    Ok(connected) => {
                        debug!(session_id = %self.id, "Transport connected");
                        bridge = Some(connected);
                    }
                    Err(err) => {
                        warn!(session_id = %self.id, "Transport connect failed: {}", err);
                        break Some(ConnectAbort::Failed(err.into()));
                    }
                },
                result = &mut model_leg, if session.is_none() => match result {
                    Ok(opened) => {
                        debug!(session_id = %self.id, "Model session opened");
                        session = Some(opened);
                    }
                    Err(err) => {
                        warn!(session_id = %self.id, "Model connect failed: {}", err);
                        break Some(ConnectAbort::Failed(err.into()));
                    }
                },
                _ = &mut deadline => {
                    break Some(ConnectAbort::Failed(SessionError::ConnectTimeout(connect_timeout)));
                }
                _ = self.stop.cancelled() => break Some(ConnectAbort::Stopped),
            }
        };

        match (abort, bridge, session) {
            (None, Some(bridge), Some(session)) => Ok((bridge, session)),
            (abort, bridge, session) => {
                self.release(bridge.map(Arc::from), session.map(Arc::from))
                    .await;
                Err(abort.unwrap_or(ConnectAbort::Stopped))
            }
        }
    }

    fn spawn_relay(
        &mut self,
        tasks: &mut JoinSet<RelayExit>,
        bridge: &Arc<dyn TransportBridge>,
        model: &Arc<dyn ModelSession>,
        dispatcher: &Arc<ToolDispatcher>,
    ) -> SessionResult<()> {
        let room_audio = bridge.subscribe_inbound_audio()?;
        let model_events = model.events()?;
        let client_audio = self.client_audio.take().ok_or(SessionError::Closed)?;

        tasks.spawn(forward_inbound_audio(
            self.id.clone(),
            room_audio,
            client_audio,
            model.clone(),
            self.events.clone(),
        ));
        tasks.spawn(relay_model_events(
            self.id.clone(),
            model_events,
            model.clone(),
            bridge.clone(),
            dispatcher.clone(),
            self.events.clone(),
        ));
        Ok(())
    }

    async fn wait_for_exit(&self, tasks: &mut JoinSet<RelayExit>) -> RelayExit {
        tokio::select! {
            _ = self.stop.cancelled() => {
                info!(session_id = %self.id, "Stop requested");
                RelayExit::Stopped
            }
            joined = tasks.join_next() => match joined {
                Some(Ok(exit)) => exit,
                Some(Err(err)) => {
                    error!(session_id = %self.id, "Relay task failed: {}", err);
                    RelayExit::Failed(SessionError::TaskFailed(err.to_string()))
                }
                None => RelayExit::Stopped,
            },
        }
    }

    /// Close whichever legs exist, each bounded by the teardown timeout.
    async fn release(
        &self,
        bridge: Option<Arc<dyn TransportBridge>>,
        model: Option<Arc<dyn ModelSession>>,
    ) {
        let limit = self.config.teardown_timeout;
        let id = &self.id;

        let close_bridge = async {
            if let Some(bridge) = bridge {
                match tokio::time::timeout(limit, bridge.close()).await {
                    Ok(Ok(())) => debug!(session_id = %id, "Transport released"),
                    Ok(Err(err)) => warn!(session_id = %id, "Transport close failed: {}", err),
                    Err(_) => warn!(session_id = %id, "Transport close timed out"),
                }
            }
        };
        let close_model = async {
            if let Some(model) = model {
                match tokio::time::timeout(limit, model.close()).await {
                    Ok(Ok(())) => debug!(session_id = %id, "Model session released"),
                    Ok(Err(err)) => warn!(session_id = %id, "Model close failed: {}", err),
                    Err(_) => warn!(session_id = %id, "Model close timed out"),
                }
            }
        };
        tokio::join!(close_bridge, close_model);
    }

    fn set_state(&mut self, next: SessionState) {
        match self.state.transition(next) {
            Ok(true) => {
                debug!(session_id = %self.id, from = %self.state, to = %next, "Session state change");
                self.state = next;
                self.events.publish(RelayEvent::State { state: next });
                if !next.is_terminal() {
                    self.state_tx.send_replace(next);
                }
            }
            Ok(false) => {}
            Err(err) => error!(session_id = %self.id, "{}", err),
        }
    }

    /// Enter the terminal state and publish the single `closed` event.
    fn finish(&mut self, error: Option<SessionError>, reason: &str) {
        self.registry.remove(&self.id);

        let terminal = match &error {
            Some(err) => {
                error!(session_id = %self.id, code = err.code(), "Session failed: {}", err);
                self.events
                    .publish(RelayEvent::error(err.code(), err.to_string()));
                SessionState::Failed
            }
            None => SessionState::Closed,
        };
        self.set_state(terminal);
        self.events.publish(RelayEvent::Closed {
            reason: reason.to_string(),
        });
        self.events.close();
        self.state_tx.send_replace(terminal);

        info!(session_id = %self.id, state = %terminal, reason, "Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_carries_profile_tools() {
        let config = RelayConfig::default().model_session_config();
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.tools[0].function.name, "knowledge_base_search");
        assert!(config.instructions.is_some());
    }

    #[test]
    fn test_plain_profile_has_no_tools() {
        let relay = RelayConfig {
            profile: AgentProfile::Plain,
            ..Default::default()
        };
        assert!(relay.model_session_config().tools.is_empty());
    }

    #[test]
    fn test_explicit_instructions_are_kept() {
        let mut relay = RelayConfig::default();
        relay.model.instructions = Some("Speak like a pirate.".into());
        assert_eq!(
            relay.model_session_config().instructions.as_deref(),
            Some("Speak like a pirate.")
        );
    }
}
