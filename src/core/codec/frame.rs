//! Audio frame type shared by every stage of the relay.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Bytes per PCM16 sample.
pub const SAMPLE_WIDTH: usize = 2;

/// Sample rate and channel layout of a PCM16 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub const fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1)
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz/{} ch", self.sample_rate, self.channels)
    }
}

/// Origin of an audio frame.
///
/// Sequence numbers are allocated per source, so a client frame and a model
/// frame may carry the same sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSource {
    /// Microphone audio from the room or the client channel.
    Client,
    /// Synthesized speech from the model service.
    Model,
}

impl std::fmt::Display for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSource::Client => write!(f, "client"),
            FrameSource::Model => write!(f, "model"),
        }
    }
}

/// An immutable chunk of interleaved PCM16 little-endian audio.
///
/// Frames are never mutated after they are handed to the next stage. Stages
/// that need a different format or sequence number consume the frame and
/// produce a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    sample_rate: u32,
    channels: u16,
    sequence: u64,
    source: FrameSource,
}

impl AudioFrame {
    /// Wrap an existing PCM16 little-endian buffer.
    ///
    /// The buffer is not validated here; alignment is checked by the codec
    /// when the frame is converted.
    pub fn new(
        data: Bytes,
        sample_rate: u32,
        channels: u16,
        sequence: u64,
        source: FrameSource,
    ) -> Self {
        Self {
            data,
            sample_rate,
            channels,
            sequence,
            source,
        }
    }

    /// Encode signed 16-bit samples into a new frame.
    pub fn from_samples(
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
        sequence: u64,
        source: FrameSource,
    ) -> Self {
        let mut data = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(Bytes::from(data), sample_rate, channels, sequence, source)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn source(&self) -> FrameSource {
        self.source
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat::new(self.sample_rate, self.channels)
    }

    /// Consume the frame and return its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Consume the frame and return an identical frame with a new sequence number.
    pub fn with_sequence(self, sequence: u64) -> Self {
        Self { sequence, ..self }
    }

    /// Total number of samples across all channels.
    pub fn sample_count(&self) -> usize {
        self.data.len() / SAMPLE_WIDTH
    }

    /// Number of samples in each channel.
    pub fn samples_per_channel(&self) -> usize {
        match self.channels {
            0 => 0,
            n => self.sample_count() / n as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of the frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples_per_channel() as f64 / self.sample_rate as f64)
    }

    /// Decode the payload into signed 16-bit samples.
    ///
    /// A trailing odd byte is ignored.
    pub fn to_samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(SAMPLE_WIDTH)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect()
    }
}
