//! Merging YAML and environment configuration.

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{RelaySettings, ServerConfig};
use crate::core::realtime::OpenAIRealtimeVoice;
use crate::core::tools::AgentProfile;

/// Build the final configuration.
///
/// Each value is taken from the YAML file if present, then from the
/// environment, then from the defaults.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();
    let defaults = ServerConfig::default();

    let server = yaml.server.unwrap_or_default();
    let livekit = yaml.livekit.unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let retrieval = yaml.retrieval.unwrap_or_default();
    let relay = yaml.relay.unwrap_or_default();
    let relay_defaults = &defaults.relay;

    let openai_voice = match openai.voice.or(env.openai_voice) {
        Some(raw) => raw.parse::<OpenAIRealtimeVoice>()?,
        None => defaults.openai_voice,
    };
    let profile = match relay.profile.or(env.relay_profile) {
        Some(raw) => raw.parse::<AgentProfile>()?,
        None => relay_defaults.profile,
    };

    Ok(ServerConfig {
        host: server.host.or(env.host).unwrap_or_else(|| defaults.host.clone()),
        port: server.port.or(env.port).unwrap_or(defaults.port),
        livekit_url: livekit
            .url
            .or(env.livekit_url)
            .unwrap_or_else(|| defaults.livekit_url.clone()),
        livekit_api_key: livekit.api_key.or(env.livekit_api_key),
        livekit_api_secret: livekit.api_secret.or(env.livekit_api_secret),
        livekit_agent_identity: livekit
            .agent_identity
            .or(env.livekit_agent_identity)
            .unwrap_or_else(|| defaults.livekit_agent_identity.clone()),
        openai_api_key: openai.api_key.or(env.openai_api_key),
        openai_model: openai
            .model
            .or(env.openai_model)
            .unwrap_or_else(|| defaults.openai_model.clone()),
        openai_voice,
        retrieval_url: retrieval
            .url
            .or(env.retrieval_url)
            .unwrap_or_else(|| defaults.retrieval_url.clone()),
        retrieval_top_k: retrieval
            .top_k
            .or(env.retrieval_top_k)
            .unwrap_or(defaults.retrieval_top_k),
        retrieval_timeout_secs: retrieval
            .timeout_secs
            .or(env.retrieval_timeout_secs)
            .unwrap_or(defaults.retrieval_timeout_secs),
        relay: RelaySettings {
            profile,
            room_sample_rate: relay
                .room_sample_rate
                .unwrap_or(relay_defaults.room_sample_rate),
            room_channels: relay.room_channels.unwrap_or(relay_defaults.room_channels),
            outbound_queue_frames: relay
                .outbound_queue_frames
                .unwrap_or(relay_defaults.outbound_queue_frames),
            tool_grace_period_ms: relay
                .tool_grace_period_ms
                .or(env.tool_grace_period_ms)
                .unwrap_or(relay_defaults.tool_grace_period_ms),
            teardown_timeout_ms: relay
                .teardown_timeout_ms
                .or(env.teardown_timeout_ms)
                .unwrap_or(relay_defaults.teardown_timeout_ms),
            connect_timeout_ms: relay
                .connect_timeout_ms
                .or(env.connect_timeout_ms)
                .unwrap_or(relay_defaults.connect_timeout_ms),
            event_queue_warn_depth: relay
                .event_queue_warn_depth
                .unwrap_or(relay_defaults.event_queue_warn_depth),
            trace_events: relay
                .trace_events
                .or(env.trace_events)
                .unwrap_or(relay_defaults.trace_events),
        },
    })
}
