//! Audio frames and the stateless codec that moves them between formats.
//!
//! Every frame on the relay is interleaved PCM16 little-endian. The codec only
//! changes sample rate and channel layout; it never changes the encoding.

mod frame;
mod resample;

pub use frame::{AudioFrame, FrameSource, PcmFormat, SAMPLE_WIDTH};
pub use resample::{FormatError, FormatResult, MAX_RATE_RATIO, resample};
