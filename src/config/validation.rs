//! Configuration validation logic.

use super::ServerConfig;

/// Check the merged configuration for values the relay cannot run with.
pub(super) fn validate(config: &ServerConfig) -> Result<(), String> {
    if config.port == 0 {
        return Err("Server port must be non-zero".to_string());
    }

    validate_url(
        "livekit.url",
        &config.livekit_url,
        &["ws", "wss", "http", "https"],
    )?;
    validate_url("retrieval.url", &config.retrieval_url, &["http", "https"])?;

    if config.livekit_agent_identity.trim().is_empty() {
        return Err("livekit.agent_identity must not be empty".to_string());
    }
    if config.openai_model.trim().is_empty() {
        return Err("openai.model must not be empty".to_string());
    }
    if config.retrieval_top_k == 0 {
        return Err("retrieval.top_k must be at least 1".to_string());
    }
    if config.retrieval_timeout_secs == 0 {
        return Err("retrieval.timeout_secs must be non-zero".to_string());
    }

    let relay = &config.relay;
    if relay.room_sample_rate == 0 {
        return Err("relay.room_sample_rate must be non-zero".to_string());
    }
    if relay.room_channels == 0 {
        return Err("relay.room_channels must be non-zero".to_string());
    }
    if relay.outbound_queue_frames == 0 {
        return Err("relay.outbound_queue_frames must be non-zero".to_string());
    }
    if relay.connect_timeout_ms == 0 || relay.teardown_timeout_ms == 0 {
        return Err("relay connect and teardown timeouts must be non-zero".to_string());
    }

    Ok(())
}

fn validate_url(key: &str, value: &str, schemes: &[&str]) -> Result<(), String> {
    let url = url::Url::parse(value).map_err(|e| format!("Invalid {key} '{value}': {e}"))?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!(
            "Invalid {key} '{value}': scheme must be one of {}",
            schemes.join(", ")
        ));
    }
    Ok(())
}
