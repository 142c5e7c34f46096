//! Environment variable loading.

use std::str::FromStr;

/// Configuration values read from the process environment.
///
/// Every field is optional; unset or blank variables are `None`.
#[derive(Debug, Default)]
pub(super) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub livekit_url: Option<String>,
    pub livekit_api_key: Option<String>,
    pub livekit_api_secret: Option<String>,
    pub livekit_agent_identity: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_voice: Option<String>,
    pub retrieval_url: Option<String>,
    pub retrieval_top_k: Option<usize>,
    pub retrieval_timeout_secs: Option<u64>,
    pub relay_profile: Option<String>,
    pub tool_grace_period_ms: Option<u64>,
    pub teardown_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub trace_events: Option<bool>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, String> {
        Ok(Self {
            host: env_var("HOST"),
            port: env_parse("PORT")?,
            livekit_url: env_var("LIVEKIT_URL"),
            livekit_api_key: env_var("LIVEKIT_API_KEY"),
            livekit_api_secret: env_var("LIVEKIT_API_SECRET"),
            livekit_agent_identity: env_var("LIVEKIT_AGENT_IDENTITY"),
            openai_api_key: env_var("OPENAI_API_KEY"),
            openai_model: env_var("OPENAI_REALTIME_MODEL"),
            openai_voice: env_var("OPENAI_REALTIME_VOICE"),
            retrieval_url: env_var("RETRIEVAL_URL"),
            retrieval_top_k: env_parse("RETRIEVAL_TOP_K")?,
            retrieval_timeout_secs: env_parse("RETRIEVAL_TIMEOUT_SECS")?,
            relay_profile: env_var("RELAY_PROFILE"),
            tool_grace_period_ms: env_parse("RELAY_TOOL_GRACE_PERIOD_MS")?,
            teardown_timeout_ms: env_parse("RELAY_TEARDOWN_TIMEOUT_MS")?,
            connect_timeout_ms: env_parse("RELAY_CONNECT_TIMEOUT_MS")?,
            trace_events: env_bool("RELAY_TRACE_EVENTS")?,
        })
    }
}

/// Read a variable, treating blank values as unset.
pub(super) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| format!("Invalid value for {name} ('{raw}'): {e}"))
        })
        .transpose()
}

pub(super) fn env_bool(name: &str) -> Result<Option<bool>, String> {
    env_var(name)
        .map(|raw| parse_bool(&raw).ok_or_else(|| format!("Invalid boolean for {name}: '{raw}'")))
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    #[serial]
    fn test_blank_is_unset() {
        unsafe {
            env::set_var("VOICE_RELAY_TEST_BLANK", "   ");
        }
        assert_eq!(env_var("VOICE_RELAY_TEST_BLANK"), None);
        unsafe {
            env::remove_var("VOICE_RELAY_TEST_BLANK");
        }
    }

    #[test]
    #[serial]
    fn test_env_parse_reports_variable() {
        unsafe {
            env::set_var("VOICE_RELAY_TEST_NUM", "abc");
        }
        let err = env_parse::<u16>("VOICE_RELAY_TEST_NUM").unwrap_err();
        assert!(err.contains("VOICE_RELAY_TEST_NUM"));
        assert!(err.contains("abc"));

        unsafe {
            env::set_var("VOICE_RELAY_TEST_NUM", "42");
        }
        assert_eq!(env_parse::<u16>("VOICE_RELAY_TEST_NUM"), Ok(Some(42)));
        unsafe {
            env::remove_var("VOICE_RELAY_TEST_NUM");
        }
    }
}
