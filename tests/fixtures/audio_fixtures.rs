//! Audio Test Fixtures
//!
//! Programmatically generated PCM16 audio so tests have no file
//! dependencies.

use std::f32::consts::PI;

use voice_relay::core::codec::{AudioFrame, FrameSource};

/// Room and model sample rate used by the relay tests
pub const SAMPLE_RATE: u32 = 24000;

/// 20 ms at 16 kHz
pub const FRAME_16K: usize = 320;

/// Generate silence (zeros)
pub fn generate_silence(duration_samples: usize) -> Vec<i16> {
    vec![0i16; duration_samples]
}

/// Generate a sine tone
pub fn generate_sine_wave(
    duration_samples: usize,
    frequency: f32,
    sample_rate: u32,
    amplitude: f32,
) -> Vec<i16> {
    let max_amplitude = amplitude * i16::MAX as f32;
    (0..duration_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (max_amplitude * (2.0 * PI * frequency * t).sin()) as i16
        })
        .collect()
}

/// Frame whose every sample equals `marker`, so tests can identify it after
/// forwarding.
pub fn marked_frame(marker: i16, samples: usize, sample_rate: u32, sequence: u64) -> AudioFrame {
    AudioFrame::from_samples(
        &vec![marker; samples],
        sample_rate,
        1,
        sequence,
        FrameSource::Client,
    )
}

/// First sample of a frame
pub fn frame_marker(frame: &AudioFrame) -> Option<i16> {
    frame.to_samples().first().copied()
}
