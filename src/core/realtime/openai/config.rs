//! OpenAI Realtime API constants and voice selection.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::codec::PcmFormat;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Sample rate of `pcm16` audio in both directions.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Audio format the Realtime API expects and produces.
pub const OPENAI_REALTIME_FORMAT: PcmFormat = PcmFormat::mono(OPENAI_REALTIME_SAMPLE_RATE);

/// Wire name of the audio format.
pub const OPENAI_AUDIO_FORMAT: &str = "pcm16";

pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Voices accepted by the Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIRealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl OpenAIRealtimeVoice {
    pub const ALL: [OpenAIRealtimeVoice; 8] = [
        Self::Alloy,
        Self::Ash,
        Self::Ballad,
        Self::Coral,
        Self::Echo,
        Self::Sage,
        Self::Shimmer,
        Self::Verse,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }
}

impl FromStr for OpenAIRealtimeVoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "unsupported voice '{s}', expected one of: {}",
                    Self::ALL.map(|v| v.as_str()).join(", ")
                )
            })
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_parse_is_case_insensitive() {
        assert_eq!(
            "SHIMMER".parse::<OpenAIRealtimeVoice>(),
            Ok(OpenAIRealtimeVoice::Shimmer)
        );
        assert_eq!(
            " alloy ".parse::<OpenAIRealtimeVoice>(),
            Ok(OpenAIRealtimeVoice::Alloy)
        );
    }

    #[test]
    fn test_unknown_voice_lists_choices() {
        let err = "robot".parse::<OpenAIRealtimeVoice>().unwrap_err();
        assert!(err.contains("robot"));
        assert!(err.contains("verse"));
    }

    #[test]
    fn test_realtime_format() {
        assert_eq!(OPENAI_REALTIME_FORMAT.sample_rate, 24000);
        assert_eq!(OPENAI_REALTIME_FORMAT.channels, 1);
    }
}
