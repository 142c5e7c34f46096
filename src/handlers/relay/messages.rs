//! Relay WebSocket message types.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Upper bound on samples in one client audio message (10 s at 48 kHz)
pub const MAX_AUDIO_SAMPLES: usize = 480_000;

/// Sample rates accepted in client audio messages
pub const SUPPORTED_SAMPLE_RATES: RangeInclusive<u32> = 8000..=48000;

/// Incoming WebSocket messages from the client
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Mono PCM16 samples
    Audio {
        data: Vec<i16>,
        /// Defaults to the room sample rate
        #[serde(default)]
        sample_rate: Option<u32>,
    },
    /// Close the session
    Stop,
}

impl ClientMessage {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ClientMessage::Audio { data, sample_rate } => {
                if data.len() > MAX_AUDIO_SAMPLES {
                    return Err(format!(
                        "audio message has {} samples, limit is {MAX_AUDIO_SAMPLES}",
                        data.len()
                    ));
                }
                match sample_rate {
                    Some(rate) if !SUPPORTED_SAMPLE_RATES.contains(rate) => Err(format!(
                        "sample_rate {rate} is outside {}..={} Hz",
                        SUPPORTED_SAMPLE_RATES.start(),
                        SUPPORTED_SAMPLE_RATES.end()
                    )),
                    _ => Ok(()),
                }
            }
            ClientMessage::Stop => Ok(()),
        }
    }
}

/// Query parameters of the relay endpoint
#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    #[serde(default)]
    pub room: Option<String>,
}
