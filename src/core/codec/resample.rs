//! Stateless PCM16 format conversion.
//!
//! `resample` converts a frame between sample rates and channel layouts using
//! linear interpolation. It keeps no state between calls, so the output for a
//! given frame never depends on the frames that came before it. That makes the
//! conversion deterministic, at the cost of a small discontinuity at frame
//! boundaries which is inaudible at the 10-20 ms frame sizes used by the relay.

use bytes::Bytes;
use thiserror::Error;

use super::frame::{AudioFrame, SAMPLE_WIDTH};

/// Errors raised when a frame cannot be converted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The payload does not divide into whole sample frames.
    #[error("frame of {len} bytes is not aligned to {width}-byte sample frames")]
    Misaligned { len: usize, width: usize },

    /// Sample rate or channel count is zero.
    #[error("invalid audio format: {0}")]
    InvalidFormat(String),
}

pub type FormatResult<T> = Result<T, FormatError>;

/// Largest accepted ratio between source and target sample rates.
///
/// 8 kHz to 48 kHz is a factor of six. Anything steeper is treated as a
/// malformed frame rather than sized into an output buffer.
pub const MAX_RATE_RATIO: u32 = 8;

/// Convert `frame` to `target_rate` Hz with `target_channels` channels.
///
/// The sequence number and source are carried over unchanged. When the target
/// format equals the frame's format the frame is returned as-is, so repeated
/// application is a no-op. Otherwise exactly one output buffer is allocated.
pub fn resample(
    frame: AudioFrame,
    target_rate: u32,
    target_channels: u16,
) -> FormatResult<AudioFrame> {
    if target_rate == 0 || target_channels == 0 {
        return Err(FormatError::InvalidFormat(format!(
            "target {target_rate} Hz / {target_channels} channels"
        )));
    }
    if frame.sample_rate() == 0 || frame.channels() == 0 {
        return Err(FormatError::InvalidFormat(format!(
            "source {} Hz / {} channels",
            frame.sample_rate(),
            frame.channels()
        )));
    }

    let (low, high) = if frame.sample_rate() < target_rate {
        (frame.sample_rate(), target_rate)
    } else {
        (target_rate, frame.sample_rate())
    };
    if high as u64 > low as u64 * MAX_RATE_RATIO as u64 {
        return Err(FormatError::InvalidFormat(format!(
            "{} Hz to {target_rate} Hz exceeds a ratio of {MAX_RATE_RATIO}",
            frame.sample_rate()
        )));
    }

    let in_channels = frame.channels() as usize;
    let width = SAMPLE_WIDTH * in_channels;
    let len = frame.data().len();
    if len % width != 0 {
        return Err(FormatError::Misaligned { len, width });
    }

    if frame.sample_rate() == target_rate && frame.channels() == target_channels {
        return Ok(frame);
    }

    let in_frames = len / width;
    let out_frames = output_frame_count(in_frames, frame.sample_rate(), target_rate);
    let out_channels = target_channels as usize;

    let mut out = Vec::with_capacity(out_frames * out_channels * SAMPLE_WIDTH);
    let reader = PcmReader {
        data: frame.data(),
        channels: in_channels,
    };
    let step = frame.sample_rate() as f64 / target_rate as f64;

    for i in 0..out_frames {
        let position = i as f64 * step;
        let index = position.floor() as usize;
        let fraction = position - index as f64;
        let next = (index + 1).min(in_frames - 1);

        for channel in 0..out_channels {
            let a = reader.mapped(index, channel, out_channels);
            let b = reader.mapped(next, channel, out_channels);
            let value = a + (b - a) * fraction;
            out.extend_from_slice(&to_i16(value).to_le_bytes());
        }
    }

    Ok(AudioFrame::new(
        Bytes::from(out),
        target_rate,
        target_channels,
        frame.sequence(),
        frame.source(),
    ))
}

fn output_frame_count(in_frames: usize, source_rate: u32, target_rate: u32) -> usize {
    if in_frames == 0 {
        return 0;
    }
    let scaled = in_frames as u64 * target_rate as u64;
    scaled.div_ceil(source_rate as u64) as usize
}

fn to_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Borrowed view over interleaved PCM16 little-endian bytes.
struct PcmReader<'a> {
    data: &'a [u8],
    channels: usize,
}

impl PcmReader<'_> {
    fn sample(&self, frame: usize, channel: usize) -> f64 {
        let offset = (frame * self.channels + channel) * SAMPLE_WIDTH;
        i16::from_le_bytes([self.data[offset], self.data[offset + 1]]) as f64
    }

    /// Sample for `out_channel` of an output layout with `out_channels` channels.
    ///
    /// Mono output averages every input channel, mono input is duplicated,
    /// and any other mismatch maps extra output channels onto the last input.
    fn mapped(&self, frame: usize, out_channel: usize, out_channels: usize) -> f64 {
        if out_channels == self.channels {
            return self.sample(frame, out_channel);
        }
        if out_channels == 1 {
            let sum: f64 = (0..self.channels).map(|c| self.sample(frame, c)).sum();
            return sum / self.channels as f64;
        }
        if self.channels == 1 {
            return self.sample(frame, 0);
        }
        self.sample(frame, out_channel.min(self.channels - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::FrameSource;

    fn sine(samples: usize, rate: u32) -> Vec<i16> {
        (0..samples)
            .map(|i| {
                let t = i as f64 / rate as f64;
                ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 12000.0) as i16
            })
            .collect()
    }

    #[test]
    fn test_identity_returns_input() {
        let frame = AudioFrame::from_samples(&sine(320, 16000), 16000, 1, 4, FrameSource::Client);
        let out = resample(frame.clone(), 16000, 1).unwrap();
        assert_eq!(out, frame);

        let again = resample(out, 16000, 1).unwrap();
        assert_eq!(again, frame);
    }

    #[test]
    fn test_deterministic_output() {
        let frame = AudioFrame::from_samples(&sine(480, 48000), 48000, 1, 0, FrameSource::Model);
        let a = resample(frame.clone(), 24000, 1).unwrap();
        let b = resample(frame, 24000, 1).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_each_call_stands_alone() {
        // Any frame length converts in one call, with no filter delay and no
        // carry-over from the frame converted before it.
        let loud = AudioFrame::from_samples(&[30000; 160], 16000, 1, 0, FrameSource::Client);
        let odd = AudioFrame::from_samples(&[0, 100, 200, 300, 400, 500, 600], 16000, 1, 1, FrameSource::Client);

        let alone = resample(odd.clone(), 24000, 1).unwrap();
        resample(loud, 24000, 1).unwrap();
        let after_loud = resample(odd, 24000, 1).unwrap();

        assert_eq!(alone.data(), after_loud.data());
        assert_eq!(alone.samples_per_channel(), 11);
        assert_eq!(alone.to_samples()[0], 0);
    }

    #[test]
    fn test_misaligned_payload_rejected() {
        let frame = AudioFrame::new(
            Bytes::from_static(&[0, 1, 2]),
            24000,
            1,
            0,
            FrameSource::Client,
        );
        assert_eq!(
            resample(frame, 16000, 1),
            Err(FormatError::Misaligned { len: 3, width: 2 })
        );

        // Six bytes is three mono samples but not a whole number of stereo frames.
        let stereo = AudioFrame::new(
            Bytes::from_static(&[0; 6]),
            24000,
            2,
            0,
            FrameSource::Client,
        );
        assert!(matches!(
            resample(stereo, 24000, 1),
            Err(FormatError::Misaligned { len: 6, width: 4 })
        ));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let frame = AudioFrame::from_samples(&[0; 4], 0, 1, 0, FrameSource::Client);
        assert!(matches!(
            resample(frame.clone(), 24000, 1),
            Err(FormatError::InvalidFormat(_))
        ));
        assert!(matches!(
            resample(frame, 0, 1),
            Err(FormatError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_extreme_rate_ratio_rejected() {
        let frame = AudioFrame::from_samples(&[0; 1000], 1, 1, 0, FrameSource::Client);
        assert!(matches!(
            resample(frame, 24000, 1),
            Err(FormatError::InvalidFormat(_))
        ));

        let frame = AudioFrame::from_samples(&[0; 1000], 384_000, 1, 0, FrameSource::Client);
        assert!(matches!(
            resample(frame, 24000, 1),
            Err(FormatError::InvalidFormat(_))
        ));

        // 8 kHz to 48 kHz is within bounds
        let frame = AudioFrame::from_samples(&[0; 80], 8000, 1, 0, FrameSource::Client);
        assert_eq!(resample(frame, 48000, 1).unwrap().samples_per_channel(), 480);
    }

    #[test]
    fn test_downsample_halves_length() {
        let frame = AudioFrame::from_samples(&sine(480, 48000), 48000, 1, 7, FrameSource::Client);
        let out = resample(frame, 24000, 1).unwrap();
        assert_eq!(out.sample_rate(), 24000);
        assert_eq!(out.samples_per_channel(), 240);
        assert_eq!(out.sequence(), 7);
        assert_eq!(out.source(), FrameSource::Client);
    }

    #[test]
    fn test_upsample_interpolates_between_samples() {
        let frame = AudioFrame::from_samples(&[0, 100, 200], 8000, 1, 0, FrameSource::Client);
        let out = resample(frame, 16000, 1).unwrap();
        assert_eq!(out.to_samples(), vec![0, 50, 100, 150, 200, 200]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let frame = AudioFrame::from_samples(&[100, 300, -50, 50], 24000, 2, 0, FrameSource::Client);
        let out = resample(frame, 24000, 1).unwrap();
        assert_eq!(out.to_samples(), vec![200, 0]);
        assert_eq!(out.channels(), 1);
    }

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let frame = AudioFrame::from_samples(&[10, -10], 24000, 1, 0, FrameSource::Model);
        let out = resample(frame, 24000, 2).unwrap();
        assert_eq!(out.to_samples(), vec![10, 10, -10, -10]);
    }

    #[test]
    fn test_empty_frame_converts_to_empty() {
        let frame = AudioFrame::from_samples(&[], 48000, 1, 0, FrameSource::Client);
        let out = resample(frame, 24000, 1).unwrap();
        assert!(out.is_empty());
    }
}
