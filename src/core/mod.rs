pub mod codec;
pub mod events;
pub mod realtime;
pub mod session;
pub mod tools;
pub mod transport;

// Re-export commonly used types for convenience
pub use codec::{AudioFrame, FormatError, FrameSource, PcmFormat, resample};

pub use events::{EventMultiplexer, RelayEvent};

pub use realtime::{
    ModelConnector, ModelError, ModelEvent, ModelSession, ModelSessionConfig,
    OpenAIRealtimeConnector,
};

pub use session::{
    RelayConfig, SessionError, SessionHandle, SessionManager, SessionRegistry, SessionState,
};

pub use tools::{
    AgentProfile, HttpRetrievalEngine, RetrievalEngine, RetrievedSnippet, ToolDispatcher,
    ToolError,
};

pub use transport::{
    LiveKitTokenIssuer, LiveKitTransport, TokenIssuer, TransportBridge, TransportConnector,
    TransportError,
};
