use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// livekit:
///   url: "ws://localhost:7880"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///   agent_identity: "voice-agent"
///
/// openai:
///   api_key: "sk-..."
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///
/// retrieval:
///   url: "http://localhost:8000/search"
///   top_k: 3
///   timeout_secs: 10
///
/// relay:
///   profile: "knowledge_assistant"
///   room_sample_rate: 24000
///   room_channels: 1
///   outbound_queue_frames: 50
///   tool_grace_period_ms: 5000
///   teardown_timeout_ms: 3000
///   connect_timeout_ms: 10000
///   event_queue_warn_depth: 1024
///   trace_events: false
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub livekit: Option<LiveKitYaml>,
    pub openai: Option<OpenAIYaml>,
    pub retrieval: Option<RetrievalYaml>,
    pub relay: Option<RelayYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// LiveKit configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveKitYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Identity the relay joins rooms with
    pub agent_identity: Option<String>,
}

/// OpenAI Realtime configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
}

/// Knowledge base search service from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetrievalYaml {
    pub url: Option<String>,
    pub top_k: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Relay tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub profile: Option<String>,
    pub room_sample_rate: Option<u32>,
    pub room_channels: Option<u16>,
    pub outbound_queue_frames: Option<usize>,
    pub tool_grace_period_ms: Option<u64>,
    pub teardown_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub event_queue_warn_depth: Option<usize>,
    pub trace_events: Option<bool>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

livekit:
  url: "ws://livekit.example.com"
  api_key: "test-key"
  api_secret: "test-secret"
  agent_identity: "kb-agent"

openai:
  api_key: "sk-test"
  model: "gpt-4o-mini-realtime-preview"
  voice: "verse"

retrieval:
  url: "http://kb.internal/search"
  top_k: 5
  timeout_secs: 4

relay:
  profile: "plain"
  room_sample_rate: 48000
  room_channels: 2
  outbound_queue_frames: 20
  tool_grace_period_ms: 1000
  trace_events: true
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("127.0.0.1".to_string())
        );
        assert_eq!(config.server.as_ref().unwrap().port, Some(8080));
        let livekit = config.livekit.as_ref().unwrap();
        assert_eq!(livekit.url, Some("ws://livekit.example.com".to_string()));
        assert_eq!(livekit.agent_identity, Some("kb-agent".to_string()));
        let openai = config.openai.as_ref().unwrap();
        assert_eq!(openai.voice, Some("verse".to_string()));
        let retrieval = config.retrieval.as_ref().unwrap();
        assert_eq!(retrieval.top_k, Some(5));
        assert_eq!(retrieval.timeout_secs, Some(4));
        let relay = config.relay.as_ref().unwrap();
        assert_eq!(relay.profile, Some("plain".to_string()));
        assert_eq!(relay.room_channels, Some(2));
        assert_eq!(relay.teardown_timeout_ms, None);
        assert_eq!(relay.trace_events, Some(true));
    }

    #[test]
    fn test_yaml_config_empty_sections() {
        let config: YamlConfig = serde_yaml::from_str("server:\n  port: 9000\n").unwrap();
        assert_eq!(config.server.unwrap().port, Some(9000));
        assert!(config.livekit.is_none());
        assert!(config.relay.is_none());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "openai:\n  model: \"gpt-4o-realtime-preview\"\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(
            config.openai.unwrap().model,
            Some("gpt-4o-realtime-preview".to_string())
        );
    }

    #[test]
    fn test_yaml_wrong_type_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: \"not-a-port\"\n").unwrap();

        let err = YamlConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML"));
    }
}
