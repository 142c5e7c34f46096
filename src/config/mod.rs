//! Configuration module for the voice relay
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::codec::PcmFormat;
use crate::core::realtime::{
    ModelSessionConfig, OpenAIRealtimeVoice, openai::DEFAULT_REALTIME_MODEL,
};
use crate::core::session::RelayConfig;
use crate::core::tools::AgentProfile;
use crate::core::transport::LiveKitTransportConfig;

/// Relay tuning knobs
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    /// Agent profile selecting the tool set
    /// Default: knowledge_assistant
    pub profile: AgentProfile,
    /// Sample rate used for room audio in both directions
    /// Default: 24000
    pub room_sample_rate: u32,
    /// Default: 1
    pub room_channels: u16,
    /// Outbound (agent to room) queue capacity in frames
    /// Default: 50
    pub outbound_queue_frames: usize,
    /// How long closing sessions wait for pending tool calls
    /// Default: 5000
    pub tool_grace_period_ms: u64,
    /// Bound on releasing each connector at teardown
    /// Default: 3000
    pub teardown_timeout_ms: u64,
    /// Bound on establishing both connectors
    /// Default: 10000
    pub connect_timeout_ms: u64,
    /// Queue depth that triggers a warning
    /// Default: 1024
    pub event_queue_warn_depth: usize,
    /// Log every relay event at debug level
    /// Default: false
    pub trace_events: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            profile: AgentProfile::KnowledgeAssistant,
            room_sample_rate: 24000,
            room_channels: 1,
            outbound_queue_frames: 50,
            tool_grace_period_ms: 5000,
            teardown_timeout_ms: 3000,
            connect_timeout_ms: 10000,
            event_queue_warn_depth: 1024,
            trace_events: false,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the relay, including:
/// - Server settings (host, port)
/// - LiveKit room server and credentials
/// - OpenAI Realtime model settings
/// - Knowledge base search service
/// - Relay tuning
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    // LiveKit settings
    pub livekit_url: String,
    pub livekit_api_key: Option<String>,
    pub livekit_api_secret: Option<String>,
    /// Identity the relay joins rooms with
    /// Default: voice-agent
    pub livekit_agent_identity: String,

    // OpenAI Realtime settings
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_voice: OpenAIRealtimeVoice,

    // Knowledge base search
    pub retrieval_url: String,
    /// Snippets requested per search
    /// Default: 3
    pub retrieval_top_k: usize,
    pub retrieval_timeout_secs: u64,

    pub relay: RelaySettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            livekit_url: "ws://localhost:7880".to_string(),
            livekit_api_key: None,
            livekit_api_secret: None,
            livekit_agent_identity: "voice-agent".to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_REALTIME_MODEL.to_string(),
            openai_voice: OpenAIRealtimeVoice::default(),
            retrieval_url: "http://localhost:8000/search".to_string(),
            retrieval_top_k: 3,
            retrieval_timeout_secs: 10,
            relay: RelaySettings::default(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(secret: &Option<String>) -> &'static str {
            if secret.is_some() { "<redacted>" } else { "<unset>" }
        }
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("livekit_url", &self.livekit_url)
            .field("livekit_api_key", &self.livekit_api_key)
            .field("livekit_api_secret", &redact(&self.livekit_api_secret))
            .field("livekit_agent_identity", &self.livekit_agent_identity)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_model", &self.openai_model)
            .field("openai_voice", &self.openai_voice)
            .field("retrieval_url", &self.retrieval_url)
            .field("retrieval_top_k", &self.retrieval_top_k)
            .field("retrieval_timeout_secs", &self.retrieval_timeout_secs)
            .field("relay", &self.relay)
            .finish()
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.livekit_api_key {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.livekit_api_secret {
            secret.zeroize();
        }
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults)
    ///
    /// The .env file is loaded into the environment by the binary at startup.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// PCM format used for room audio.
    pub fn room_format(&self) -> PcmFormat {
        PcmFormat::new(self.relay.room_sample_rate, self.relay.room_channels)
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    /// LiveKit API key and secret, required to issue room tokens.
    pub fn livekit_credentials(&self) -> Result<(&str, &str), String> {
        match (&self.livekit_api_key, &self.livekit_api_secret) {
            (Some(key), Some(secret)) => Ok((key.as_str(), secret.as_str())),
            _ => Err(
                "LiveKit API key and secret are required (LIVEKIT_API_KEY, LIVEKIT_API_SECRET)"
                    .to_string(),
            ),
        }
    }

    pub fn openai_api_key(&self) -> Result<&str, String> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| "OpenAI API key is required (OPENAI_API_KEY)".to_string())
    }

    /// Settings for the LiveKit transport connector.
    pub fn transport_config(&self) -> LiveKitTransportConfig {
        let mut config = LiveKitTransportConfig::new(self.livekit_url.clone(), self.room_format());
        config.outbound_capacity = self.relay.outbound_queue_frames;
        config
    }

    /// Per-session settings for the session manager.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            profile: self.relay.profile,
            model: ModelSessionConfig {
                model: self.openai_model.clone(),
                voice: self.openai_voice.to_string(),
                ..Default::default()
            },
            agent_identity: self.livekit_agent_identity.clone(),
            retrieval_top_k: self.retrieval_top_k,
            tool_grace_period: Duration::from_millis(self.relay.tool_grace_period_ms),
            teardown_timeout: Duration::from_millis(self.relay.teardown_timeout_ms),
            connect_timeout: Duration::from_millis(self.relay.connect_timeout_ms),
            event_queue_warn_depth: self.relay.event_queue_warn_depth,
            trace_events: self.relay.trace_events,
        }
    }
}
